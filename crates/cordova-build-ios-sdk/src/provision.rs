//! Platform provisioning.
//!
//! Brings `platforms/ios` into the state the build needs before the build
//! runs. The decision ([`ProvisionPlan::decide`]) is pure; [`provision`]
//! executes it through a [`Toolchain`].
//!
//! | platform exists | re-add requested | steps |
//! |-----------------|------------------|-------|
//! | no  | no  | add |
//! | no  | yes | add |
//! | yes | no  | (none) |
//! | yes | yes | remove, add |

use std::fmt;
use std::path::Path;

use tracing::{debug, info};

use crate::builders::common::platform_dir;
use crate::toolchain::Toolchain;
use crate::types::{BuildConfiguration, BuildError, PLATFORM};

/// Whether the platform subtree exists, sampled at the start of an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformState {
    /// `platforms/ios` exists on disk.
    pub exists: bool,
}

impl PlatformState {
    /// Checks the platform subtree under `project_root`.
    pub fn detect(project_root: &Path) -> Self {
        Self {
            exists: platform_dir(project_root).exists(),
        }
    }
}

/// A single provisioning action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionStep {
    /// Remove the platform.
    Remove {
        /// Platform name.
        platform: String,
    },
    /// Add the platform.
    Add {
        /// Platform spec, `ios` or `ios@<version>`.
        spec: String,
    },
}

impl fmt::Display for ProvisionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProvisionStep::Remove { platform } => write!(f, "platform rm {}", platform),
            ProvisionStep::Add { spec } => write!(f, "platform add {}", spec),
        }
    }
}

/// Ordered provisioning steps for one invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvisionPlan {
    steps: Vec<ProvisionStep>,
}

impl ProvisionPlan {
    /// Decides which steps are needed.
    ///
    /// A remove only happens when the platform exists and a re-add was
    /// requested; an add happens when the platform is missing or a re-add was
    /// requested. An existing platform without re-add needs nothing.
    pub fn decide(state: PlatformState, config: &BuildConfiguration) -> Self {
        let re_add = state.exists && config.re_add_platform;
        let mut steps = Vec::with_capacity(2);

        if re_add {
            steps.push(ProvisionStep::Remove {
                platform: PLATFORM.to_string(),
            });
        }
        if !state.exists || re_add {
            steps.push(ProvisionStep::Add {
                spec: config.platform_spec(),
            });
        }

        debug!(exists = state.exists, re_add = config.re_add_platform, ?steps, "provisioning plan");
        Self { steps }
    }

    /// Returns the steps in execution order.
    pub fn steps(&self) -> &[ProvisionStep] {
        &self.steps
    }

    /// Returns `true` when no external call is needed.
    pub fn is_noop(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Executes `plan` against `project_root`.
///
/// Steps run strictly in order and each must finish before the next starts.
/// The first failure is returned as-is; nothing is retried and no later step
/// runs.
pub fn provision<T: Toolchain>(
    toolchain: &T,
    project_root: &Path,
    plan: &ProvisionPlan,
) -> Result<(), BuildError> {
    if plan.is_noop() {
        debug!("platform present, skipping provisioning");
        return Ok(());
    }

    for step in plan.steps() {
        info!(%step, "provisioning");
        match step {
            ProvisionStep::Remove { platform } => {
                toolchain.remove_platform(project_root, platform)?
            }
            ProvisionStep::Add { spec } => toolchain.add_platform(project_root, spec)?,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::fs;
    use tempfile::TempDir;

    #[derive(Default)]
    struct RecordingToolchain {
        calls: RefCell<Vec<String>>,
        fail_remove: bool,
    }

    impl Toolchain for RecordingToolchain {
        fn remove_platform(&self, _root: &Path, platform: &str) -> Result<(), BuildError> {
            self.calls.borrow_mut().push(format!("rm {platform}"));
            if self.fail_remove {
                return Err(BuildError::Provision("remove rejected".into()));
            }
            Ok(())
        }

        fn add_platform(&self, _root: &Path, spec: &str) -> Result<(), BuildError> {
            self.calls.borrow_mut().push(format!("add {spec}"));
            Ok(())
        }

        fn build(&self, _root: &Path, _p: &[&str], _o: &[String]) -> Result<(), BuildError> {
            self.calls.borrow_mut().push("build".into());
            Ok(())
        }
    }

    fn run(exists: bool, re_add_platform: bool) -> Vec<String> {
        let toolchain = RecordingToolchain::default();
        let config = BuildConfiguration {
            re_add_platform,
            ..Default::default()
        };
        let plan = ProvisionPlan::decide(PlatformState { exists }, &config);
        provision(&toolchain, Path::new("/project"), &plan).unwrap();
        toolchain.calls.into_inner()
    }

    #[test]
    fn missing_platform_is_added_once() {
        assert_eq!(run(false, false), vec!["add ios"]);
    }

    #[test]
    fn existing_platform_needs_no_calls() {
        assert!(run(true, false).is_empty());
    }

    #[test]
    fn re_add_removes_then_adds() {
        assert_eq!(run(true, true), vec!["rm ios", "add ios"]);
    }

    #[test]
    fn re_add_of_missing_platform_only_adds() {
        assert_eq!(run(false, true), vec!["add ios"]);
    }

    #[test]
    fn add_uses_versioned_spec() {
        let config = BuildConfiguration {
            version: Some("5.1.1".into()),
            ..Default::default()
        };
        let plan = ProvisionPlan::decide(PlatformState { exists: false }, &config);
        assert_eq!(
            plan.steps(),
            &[ProvisionStep::Add {
                spec: "ios@5.1.1".into()
            }]
        );
        assert_eq!(plan.steps()[0].to_string(), "platform add ios@5.1.1");
    }

    #[test]
    fn failed_remove_stops_before_add() {
        let toolchain = RecordingToolchain {
            fail_remove: true,
            ..Default::default()
        };
        let config = BuildConfiguration {
            re_add_platform: true,
            ..Default::default()
        };
        let plan = ProvisionPlan::decide(PlatformState { exists: true }, &config);

        let err = provision(&toolchain, Path::new("/project"), &plan).unwrap_err();
        assert!(matches!(err, BuildError::Provision(_)));
        assert_eq!(toolchain.calls.into_inner(), vec!["rm ios"]);
    }

    #[test]
    fn detects_platform_directory() {
        let temp = TempDir::new().unwrap();
        assert!(!PlatformState::detect(temp.path()).exists);

        fs::create_dir_all(temp.path().join("platforms").join("ios")).unwrap();
        assert!(PlatformState::detect(temp.path()).exists);
    }
}
