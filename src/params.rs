//! Per-network consensus parameters
//!
//! One immutable `Params` value per network identity, built by named
//! constructors. Behavior differences between networks are entirely
//! data-driven (the `allow_min_difficulty_blocks` / `no_pow_retargeting`
//! flags); there is no dispatch beyond the data.

use crate::compact;
use crate::types::Target;
use crate::{Error, Result};
use clap::ValueEnum;
use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Named network identities
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    /// Production network
    Main,
    /// Public test network (min-difficulty blocks allowed)
    Test,
    /// Local regression-test network (fixed difficulty)
    Regtest,
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Main => write!(f, "main"),
            Network::Test => write!(f, "test"),
            Network::Regtest => write!(f, "regtest"),
        }
    }
}

/// Soft-fork rule deployments. Consumed as opaque data by this crate; only
/// the schedule fields are carried, not the voting logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Deployment {
    /// Dummy deployment for signaling tests
    TestDummy,
    /// Relative lock-time rules
    Csv,
    /// Witness program rules
    Segwit,
}

/// Signal bit and activation window for one deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentSchedule {
    /// Version bit position used for signaling
    pub bit: u8,
    /// Start of the signaling window (seconds since Unix epoch)
    pub start_time: i64,
    /// End of the signaling window (seconds since Unix epoch)
    pub timeout: i64,
}

/// Consensus parameters governing difficulty retargeting.
///
/// Constructed once at process configuration time and never mutated
/// thereafter, except for the regtest-only deployment override, which must
/// be applied before any validation begins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Params {
    /// Network these parameters belong to
    pub network: Network,
    /// Maximum-permitted (easiest) target
    pub pow_limit: Target,
    /// Seconds a full retargeting period should take
    pub pow_target_timespan: i64,
    /// Desired seconds between consecutive blocks
    pub pow_target_spacing: i64,
    /// Permit minimum-difficulty blocks after a production stall
    pub allow_min_difficulty_blocks: bool,
    /// Difficulty never changes (fixed-difficulty test network)
    pub no_pow_retargeting: bool,
    /// Signaling blocks required to lock in a rule change
    pub rule_change_activation_threshold: u32,
    /// Number of blocks per signaling window
    pub miner_confirmation_window: u32,
    /// Deployment schedules, keyed by deployment identifier
    pub deployments: HashMap<Deployment, DeploymentSchedule>,
}

/// Main/test proof-of-work limit: 2^224 bits of ones (`0x00000000ffff..ff`)
const POW_LIMIT_MAIN: U256 = U256([u64::MAX, u64::MAX, u64::MAX, 0x0000_0000_ffff_ffff]);

/// Regtest proof-of-work limit: `0x7fff..ff`
const POW_LIMIT_REGTEST: U256 = U256([u64::MAX, u64::MAX, u64::MAX, 0x7fff_ffff_ffff_ffff]);

impl Params {
    /// Parameters for the production network
    pub fn main() -> Self {
        Self {
            network: Network::Main,
            pow_limit: Target::new(POW_LIMIT_MAIN),
            pow_target_timespan: 30 * 60,
            pow_target_spacing: 30,
            allow_min_difficulty_blocks: false,
            no_pow_retargeting: false,
            rule_change_activation_threshold: 54, // 90% of 60
            miner_confirmation_window: 60,        // timespan / spacing
            deployments: HashMap::from([
                (
                    Deployment::TestDummy,
                    DeploymentSchedule {
                        bit: 28,
                        start_time: 1199145601, // January 1, 2008
                        timeout: 1230767999,    // December 31, 2008
                    },
                ),
                (
                    Deployment::Csv,
                    DeploymentSchedule {
                        bit: 0,
                        start_time: 1462060800, // May 1, 2016
                        timeout: 1496275200,    // June 1, 2017
                    },
                ),
                (
                    Deployment::Segwit,
                    DeploymentSchedule {
                        bit: 1,
                        start_time: 1479168000, // November 15, 2016
                        timeout: 1496275200,    // June 1, 2017
                    },
                ),
            ]),
        }
    }

    /// Parameters for the public test network
    pub fn test() -> Self {
        Self {
            network: Network::Test,
            allow_min_difficulty_blocks: true,
            rule_change_activation_threshold: 45, // 75% for test chains
            deployments: HashMap::from([
                (
                    Deployment::TestDummy,
                    DeploymentSchedule {
                        bit: 28,
                        start_time: 1199145601,
                        timeout: 1230767999,
                    },
                ),
                (
                    Deployment::Csv,
                    DeploymentSchedule {
                        bit: 0,
                        start_time: 1456790400, // March 1, 2016
                        timeout: 1496275200,
                    },
                ),
                (
                    Deployment::Segwit,
                    DeploymentSchedule {
                        bit: 1,
                        start_time: 1462060800, // May 1, 2016
                        timeout: 1496275200,
                    },
                ),
            ]),
            ..Self::main()
        }
    }

    /// Parameters for the local regression-test network
    pub fn regtest() -> Self {
        let always_active = DeploymentSchedule {
            bit: 28,
            start_time: 0,
            timeout: 999_999_999_999,
        };
        Self {
            network: Network::Regtest,
            pow_limit: Target::new(POW_LIMIT_REGTEST),
            allow_min_difficulty_blocks: true,
            no_pow_retargeting: true,
            rule_change_activation_threshold: 45,
            deployments: HashMap::from([
                (Deployment::TestDummy, always_active),
                (
                    Deployment::Csv,
                    DeploymentSchedule {
                        bit: 0,
                        ..always_active
                    },
                ),
                (
                    Deployment::Segwit,
                    DeploymentSchedule {
                        bit: 1,
                        ..always_active
                    },
                ),
            ]),
            ..Self::main()
        }
    }

    /// Parameters for a named network
    pub fn for_network(network: Network) -> Self {
        match network {
            Network::Main => Self::main(),
            Network::Test => Self::test(),
            Network::Regtest => Self::regtest(),
        }
    }

    /// Number of blocks between retargets, derived from timespan and spacing
    pub fn retarget_interval(&self) -> u64 {
        (self.pow_target_timespan / self.pow_target_spacing) as u64
    }

    /// Validate the parameter invariants.
    ///
    /// A violation is a configuration defect: treat it as fatal at startup
    /// rather than deferring to per-block checks.
    pub fn validate(&self) -> Result<()> {
        if self.pow_target_spacing <= 0 {
            return Err(Error::config("pow_target_spacing must be positive"));
        }
        if self.pow_target_timespan <= 0 {
            return Err(Error::config("pow_target_timespan must be positive"));
        }
        if self.pow_target_timespan / self.pow_target_spacing < 1 {
            return Err(Error::config(
                "retarget interval must be at least one block (timespan < spacing)",
            ));
        }
        if self.pow_limit.is_zero() {
            return Err(Error::config("pow_limit must be nonzero"));
        }
        let decoded = compact::decode(compact::encode(self.pow_limit));
        if !decoded.is_valid() {
            return Err(Error::config(
                "pow_limit is not representable in the compact format",
            ));
        }
        Ok(())
    }

    /// Validate and return the parameter set, for startup call chains
    pub fn validated(self) -> Result<Self> {
        self.validate()?;
        Ok(self)
    }

    /// Override a deployment window. Only permitted on regtest, and only
    /// before block validation begins; callers must serialize this against
    /// in-flight validation.
    pub fn update_deployment(
        &mut self,
        deployment: Deployment,
        start_time: i64,
        timeout: i64,
    ) -> Result<()> {
        if self.network != Network::Regtest {
            return Err(Error::config(format!(
                "deployment overrides are only permitted on regtest, not {}",
                self.network
            )));
        }
        let schedule = self
            .deployments
            .get_mut(&deployment)
            .ok_or_else(|| Error::config("unknown deployment"))?;
        schedule.start_time = start_time;
        schedule.timeout = timeout;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_all_networks_validate() {
        for network in [Network::Main, Network::Test, Network::Regtest] {
            let params = Params::for_network(network);
            assert!(params.validate().is_ok(), "{} params invalid", network);
            assert_eq!(params.retarget_interval(), 60);
        }
    }

    #[test]
    fn test_network_flags() {
        assert!(!Params::main().allow_min_difficulty_blocks);
        assert!(!Params::main().no_pow_retargeting);
        assert!(Params::test().allow_min_difficulty_blocks);
        assert!(!Params::test().no_pow_retargeting);
        assert!(Params::regtest().allow_min_difficulty_blocks);
        assert!(Params::regtest().no_pow_retargeting);
    }

    #[test]
    fn test_pow_limit_compact_forms() {
        assert_eq!(compact::encode(Params::main().pow_limit).value(), 0x1d00ffff);
        assert_eq!(compact::encode(Params::test().pow_limit).value(), 0x1d00ffff);
        assert_eq!(
            compact::encode(Params::regtest().pow_limit).value(),
            0x207fffff
        );
    }

    #[test]
    fn test_invalid_params_rejected() {
        let mut params = Params::main();
        params.pow_target_spacing = 0;
        assert_matches!(params.validate(), Err(Error::Config { .. }));

        let mut params = Params::main();
        params.pow_target_timespan = -1800;
        assert_matches!(params.validate(), Err(Error::Config { .. }));

        // Spacing longer than the timespan leaves no room for an interval
        let mut params = Params::main();
        params.pow_target_spacing = params.pow_target_timespan + 1;
        assert_matches!(params.validate(), Err(Error::Config { .. }));

        let mut params = Params::main();
        params.pow_limit = Target::zero();
        assert_matches!(params.validate(), Err(Error::Config { .. }));
    }

    #[test]
    fn test_deployment_override_regtest_only() {
        let mut regtest = Params::regtest();
        regtest
            .update_deployment(Deployment::Segwit, 100, 200)
            .unwrap();
        let schedule = regtest.deployments[&Deployment::Segwit];
        assert_eq!(schedule.start_time, 100);
        assert_eq!(schedule.timeout, 200);
        assert_eq!(schedule.bit, 1);

        let mut main = Params::main();
        assert_matches!(
            main.update_deployment(Deployment::Segwit, 100, 200),
            Err(Error::Config { .. })
        );
    }

    #[test]
    fn test_deployment_bits() {
        for network in [Network::Main, Network::Test, Network::Regtest] {
            let params = Params::for_network(network);
            assert_eq!(params.deployments[&Deployment::TestDummy].bit, 28);
            assert_eq!(params.deployments[&Deployment::Csv].bit, 0);
            assert_eq!(params.deployments[&Deployment::Segwit].bit, 1);
        }
    }

    #[test]
    fn test_params_serde_round_trip() {
        let params = Params::test();
        let yaml = serde_yaml::to_string(&params).unwrap();
        let back: Params = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, params);
    }
}
