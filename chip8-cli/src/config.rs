//! Harness configuration.
use std::fs;

use chip8::{prelude::Chip8Conf, KeyCode};
use log::debug;
use serde::Deserialize;

use crate::{clock::Hz, error::AppError};

const DEFAULT_CYCLES: usize = 1000;

/// Settings for a headless run, read from a YAML file.
///
/// ```yaml
/// clock_frequency: 500
/// cycles: 2000
/// keys: [5]
/// seed: 42
/// index_overflow: wrap
/// unknown_opcode: fault
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CliConf {
    /// Cycles per second. Zero runs as fast as possible.
    pub clock_frequency: Hz,
    /// Number of cycles to run before stopping. `None` runs until the VM faults.
    pub cycles: Option<usize>,
    /// Keys held down for the whole run.
    pub keys: Vec<KeyCode>,
    #[serde(flatten)]
    pub vm: Chip8Conf,
}

impl Default for CliConf {
    fn default() -> Self {
        Self {
            clock_frequency: Hz::default(),
            cycles: Some(DEFAULT_CYCLES),
            keys: Vec::new(),
            vm: Chip8Conf::default(),
        }
    }
}

impl CliConf {
    pub fn from_file(filepath: &str) -> Result<Self, AppError> {
        let file = fs::File::open(filepath)?;
        let conf: CliConf = serde_yaml::from_reader(file)?;
        debug!("loaded configuration: {conf:#?}");
        Ok(conf)
    }

    pub fn from_yaml(source: &str) -> Result<Self, AppError> {
        Ok(serde_yaml::from_str(source)?)
    }
}

#[cfg(test)]
mod test {
    use chip8::prelude::{AddressPolicy, OpcodePolicy};

    use super::*;

    #[test]
    fn test_parse_config() {
        let conf = CliConf::from_yaml(concat!(
            "clock_frequency: 60\n",
            "cycles: 20\n",
            "keys: [5, 15]\n",
            "seed: 7\n",
            "index_overflow: wrap\n",
            "unknown_opcode: fault\n",
        ))
        .unwrap();

        assert_eq!(conf.clock_frequency, Hz(60));
        assert_eq!(conf.cycles, Some(20));
        assert_eq!(conf.keys, vec![KeyCode::Key5, KeyCode::KeyF]);
        assert_eq!(conf.vm.seed, Some(7));
        assert_eq!(conf.vm.index_overflow, AddressPolicy::Wrap);
        assert_eq!(conf.vm.unknown_opcode, OpcodePolicy::Fault);
    }

    #[test]
    fn test_defaults() {
        let conf = CliConf::from_yaml("cycles: 5\n").unwrap();
        assert_eq!(conf.clock_frequency, Hz(500));
        assert_eq!(conf.cycles, Some(5));
        assert!(conf.keys.is_empty());
        assert_eq!(conf.vm.seed, None);
        assert_eq!(conf.vm.index_overflow, AddressPolicy::Fault);
        assert_eq!(conf.vm.unknown_opcode, OpcodePolicy::Ignore);
    }

    #[test]
    fn test_unlimited_cycles() {
        assert_eq!(CliConf::from_yaml("cycles: ~\n").unwrap().cycles, None);
        assert_eq!(CliConf::from_yaml("{}").unwrap().cycles, Some(1000));
    }

    #[test]
    fn test_invalid_key() {
        assert!(CliConf::from_yaml("keys: [16]\n").is_err());
    }
}
