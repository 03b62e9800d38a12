//! # Configuration factory seam.
//!
//! [`ConfigurationFactory`] turns a user-supplied argument vector into a
//! [`Configuration`]. The scheduler calls it twice per command: once at
//! submission (so bad argv fails synchronously and the command is never
//! queued) and once at worker start (so each invocation runs against freshly
//! loaded state).
//!
//! [`ArgsConfigFactory`] is the bundled implementation: a flag parser over
//! the recognized option set. Deployments with their own configuration
//! format implement the trait instead.

use std::time::Duration;

use crate::error::ConfigurationError;

use super::configuration::Configuration;
use crate::devices::DeviceKind;

/// Factory seam: argv in, validated configuration out.
pub trait ConfigurationFactory: Send + Sync + 'static {
    /// Resolves an argument vector into a configuration.
    ///
    /// Must be deterministic for a given argv: the scheduler re-invokes it
    /// at worker start and expects the same scheduling options it validated
    /// at submission.
    fn create_configuration_from_args(
        &self,
        args: &[String],
    ) -> Result<Configuration, ConfigurationError>;
}

/// Bundled argv-flag parser.
///
/// The first token is the configuration name; recognized flags follow:
///
/// | Flag | Effect |
/// |------|--------|
/// | `--loop` | enable loop mode |
/// | `--min-loop-time <ms>` | minimum interval between loop invocations |
/// | `--invocation-timeout <ms>` | per-invocation limit (0 = none) |
/// | `--cutoff-battery <0-100>` | battery level that interrupts the invocation |
/// | `--serial <s>` | restrict to a serial (repeatable) |
/// | `--product-type <p>` | restrict to a product type (repeatable) |
/// | `--emulator` / `--physical` | restrict device kind |
/// | `--min-battery <0-100>` | require at least this reported battery |
#[derive(Debug, Default, Clone, Copy)]
pub struct ArgsConfigFactory;

impl ArgsConfigFactory {
    /// Creates the factory.
    pub fn new() -> Self {
        Self
    }
}

fn value<'a>(
    option: &str,
    iter: &mut std::slice::Iter<'a, String>,
) -> Result<&'a String, ConfigurationError> {
    iter.next().ok_or_else(|| ConfigurationError::MissingValue {
        option: option.to_string(),
    })
}

fn parse_u64(option: &str, raw: &str) -> Result<u64, ConfigurationError> {
    raw.parse().map_err(|_| ConfigurationError::InvalidValue {
        option: option.to_string(),
        value: raw.to_string(),
    })
}

fn parse_percent(option: &str, raw: &str) -> Result<u8, ConfigurationError> {
    let invalid = || ConfigurationError::InvalidValue {
        option: option.to_string(),
        value: raw.to_string(),
    };
    let level: u8 = raw.parse().map_err(|_| invalid())?;
    if level > 100 {
        return Err(invalid());
    }
    Ok(level)
}

impl ConfigurationFactory for ArgsConfigFactory {
    fn create_configuration_from_args(
        &self,
        args: &[String],
    ) -> Result<Configuration, ConfigurationError> {
        let mut iter = args.iter();
        let name = match iter.next() {
            Some(token) if !token.starts_with("--") && !token.is_empty() => token.clone(),
            _ => return Err(ConfigurationError::MissingName),
        };

        let mut configuration = Configuration::named(name);
        while let Some(token) = iter.next() {
            match token.as_str() {
                "--loop" => configuration.command_options.loop_mode = true,
                "--min-loop-time" => {
                    let raw = value(token, &mut iter)?;
                    configuration.command_options.min_loop_time =
                        Duration::from_millis(parse_u64(token, raw)?);
                }
                "--invocation-timeout" => {
                    let raw = value(token, &mut iter)?;
                    let ms = parse_u64(token, raw)?;
                    configuration.command_options.invocation_timeout = match ms {
                        0 => None,
                        ms => Some(Duration::from_millis(ms)),
                    };
                }
                "--cutoff-battery" => {
                    let raw = value(token, &mut iter)?;
                    configuration.device_options.cutoff_battery =
                        Some(parse_percent(token, raw)?);
                }
                "--serial" => {
                    let raw = value(token, &mut iter)?;
                    configuration.device_requirements.serials.push(raw.clone());
                }
                "--product-type" => {
                    let raw = value(token, &mut iter)?;
                    configuration
                        .device_requirements
                        .product_types
                        .push(raw.clone());
                }
                "--emulator" => configuration.device_requirements.kind = DeviceKind::Emulator,
                "--physical" => configuration.device_requirements.kind = DeviceKind::Physical,
                "--min-battery" => {
                    let raw = value(token, &mut iter)?;
                    configuration.device_requirements.min_battery =
                        Some(parse_percent(token, raw)?);
                }
                other => {
                    return Err(ConfigurationError::UnknownOption {
                        option: other.to_string(),
                    });
                }
            }
        }
        Ok(configuration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(tokens: &[&str]) -> Vec<String> {
        tokens.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn name_only() {
        let configuration = ArgsConfigFactory::new()
            .create_configuration_from_args(&argv(&["smoke"]))
            .unwrap();
        assert_eq!(configuration.name, "smoke");
        assert!(!configuration.command_options.loop_mode);
        assert!(configuration.command_options.invocation_timeout.is_none());
    }

    #[test]
    fn full_flag_set() {
        let configuration = ArgsConfigFactory::new()
            .create_configuration_from_args(&argv(&[
                "stress",
                "--loop",
                "--min-loop-time",
                "0",
                "--invocation-timeout",
                "500",
                "--cutoff-battery",
                "20",
                "--serial",
                "abc123",
                "--physical",
                "--min-battery",
                "50",
            ]))
            .unwrap();

        assert!(configuration.command_options.loop_mode);
        assert_eq!(
            configuration.command_options.min_loop_time,
            Duration::ZERO
        );
        assert_eq!(
            configuration.command_options.invocation_timeout,
            Some(Duration::from_millis(500))
        );
        assert_eq!(configuration.device_options.cutoff_battery, Some(20));
        assert_eq!(configuration.device_requirements.serials, vec!["abc123"]);
        assert_eq!(configuration.device_requirements.kind, DeviceKind::Physical);
        assert_eq!(configuration.device_requirements.min_battery, Some(50));
    }

    #[test]
    fn zero_timeout_means_none() {
        let configuration = ArgsConfigFactory::new()
            .create_configuration_from_args(&argv(&["t", "--invocation-timeout", "0"]))
            .unwrap();
        assert!(configuration.command_options.invocation_timeout.is_none());
    }

    #[test]
    fn rejects_missing_name() {
        let err = ArgsConfigFactory::new()
            .create_configuration_from_args(&argv(&[]))
            .unwrap_err();
        assert_eq!(err, ConfigurationError::MissingName);

        let err = ArgsConfigFactory::new()
            .create_configuration_from_args(&argv(&["--loop"]))
            .unwrap_err();
        assert_eq!(err, ConfigurationError::MissingName);
    }

    #[test]
    fn rejects_unknown_option() {
        let err = ArgsConfigFactory::new()
            .create_configuration_from_args(&argv(&["t", "--frobnicate"]))
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::UnknownOption { .. }));
    }

    #[test]
    fn rejects_missing_and_invalid_values() {
        let err = ArgsConfigFactory::new()
            .create_configuration_from_args(&argv(&["t", "--min-loop-time"]))
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::MissingValue { .. }));

        let err = ArgsConfigFactory::new()
            .create_configuration_from_args(&argv(&["t", "--cutoff-battery", "101"]))
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidValue { .. }));

        let err = ArgsConfigFactory::new()
            .create_configuration_from_args(&argv(&["t", "--invocation-timeout", "soon"]))
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidValue { .. }));
    }
}
