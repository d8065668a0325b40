//! Declarative helpers shared by configuration types.

/// Implements [`ConfigValidator`](crate::core::config::ConfigValidator) from a list of field rules.
///
/// # Usage
///
/// ```rust,no_run
/// // impl_config_validator!(DetectionParams {
/// //     text_threshold: range(0.0, 1.0),
/// //     detect_size: min(32),
/// // });
/// ```
///
/// The target type must implement `Default`, which backs `get_defaults`.
#[macro_export]
macro_rules! impl_config_validator {
    ($type_name:ident { $($field:ident: $validator:ident $(($($args:tt)*))?),* $(,)? }) => {
        impl $crate::core::config::ConfigValidator for $type_name {
            fn validate(&self) -> Result<(), $crate::core::config::ConfigError> {
                $(
                    $crate::validate_field!(self, $field, $validator $(($($args)*))?);
                )*
                Ok(())
            }

            fn get_defaults() -> Self
            where
                Self: Sized,
            {
                Self::default()
            }
        }
    };
}

/// Helper macro for field validation.
#[macro_export]
macro_rules! validate_field {
    ($self:expr, $field:ident, range($min:expr, $max:expr)) => {
        if !($min..=$max).contains(&$self.$field) {
            return Err($crate::core::config::ConfigError::InvalidConfig {
                message: format!(
                    "{} must be between {} and {}",
                    stringify!($field),
                    $min,
                    $max
                ),
            });
        }
    };

    ($self:expr, $field:ident, min($min_val:expr)) => {
        if $self.$field < $min_val {
            return Err($crate::core::config::ConfigError::InvalidConfig {
                message: format!("{} must be at least {}", stringify!($field), $min_val),
            });
        }
    };

    ($self:expr, $field:ident, max($max_val:expr)) => {
        if $self.$field > $max_val {
            return Err($crate::core::config::ConfigError::InvalidConfig {
                message: format!("{} must be at most {}", stringify!($field), $max_val),
            });
        }
    };
}

#[cfg(test)]
mod tests {
    use crate::core::config::ConfigValidator;

    #[derive(Debug, Clone)]
    struct ThresholdConfig {
        threshold: f32,
        size: u32,
        ratio: f32,
    }

    impl Default for ThresholdConfig {
        fn default() -> Self {
            Self {
                threshold: 0.5,
                size: 64,
                ratio: 0.5,
            }
        }
    }

    impl_config_validator!(ThresholdConfig {
        threshold: range(0.0, 1.0),
        size: min(32),
        ratio: max(1.0),
    });

    #[test]
    fn test_impl_config_validator_accepts_defaults() {
        assert!(ThresholdConfig::get_defaults().validate().is_ok());
    }

    #[test]
    fn test_impl_config_validator_rejects_each_rule() {
        let cfg = ThresholdConfig {
            threshold: 1.5,
            ..Default::default()
        };
        let err = cfg.validate().unwrap_err().to_string();
        assert!(err.contains("threshold"), "{err}");

        let cfg = ThresholdConfig {
            size: 8,
            ..Default::default()
        };
        assert!(cfg.validate().unwrap_err().to_string().contains("size"));

        let cfg = ThresholdConfig {
            ratio: 2.0,
            ..Default::default()
        };
        assert!(cfg.validate().unwrap_err().to_string().contains("ratio"));
    }
}
