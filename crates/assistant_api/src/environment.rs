//! Deployment environment detection.
//!
//! The hosted sandbox runs a restricted HTTP stack where optional transport
//! parameters can break client construction. Detection combines several
//! independent signals; by default any single signal classifies the process
//! as sandboxed. [`DetectionPolicy::AtLeast`] tightens that when local setups
//! are misclassified.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::info;

/// Variable that short-circuits detection.
pub const FORCE_ENVIRONMENT_VAR: &str = "FORCE_ENVIRONMENT";

const SANDBOX_CONFIG_PATH: &str = "/.streamlit/config.toml";
const LOCAL_CONFIG_DIR: &str = ".streamlit";
const SANDBOX_HOSTNAME_PREFIX: &str = "st-";
const PROXY_ENV_VARS: [&str; 6] = [
    "HTTP_PROXY",
    "HTTPS_PROXY",
    "NO_PROXY",
    "http_proxy",
    "https_proxy",
    "no_proxy",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Environment {
    Sandboxed,
    Unrestricted,
}

impl Environment {
    pub fn label(self) -> &'static str {
        match self {
            Self::Sandboxed => "hosted sandbox",
            Self::Unrestricted => "local",
        }
    }

    /// Parses an override value. Unknown values yield `None`.
    pub fn from_override(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "cloud" | "sandboxed" | "sandbox" => Some(Self::Sandboxed),
            "local" | "unrestricted" => Some(Self::Unrestricted),
            _ => None,
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// How many signals must fire to classify the process as sandboxed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DetectionPolicy {
    #[default]
    AnySignal,
    AtLeast(usize),
}

impl DetectionPolicy {
    fn is_sandboxed(self, fired: usize) -> bool {
        match self {
            Self::AnySignal => fired > 0,
            Self::AtLeast(threshold) => fired >= threshold.max(1),
        }
    }
}

/// Read-only view of the process surroundings used by detection.
pub trait EnvironmentProbe {
    fn var(&self, key: &str) -> Option<String>;
    fn path_exists(&self, path: &Path) -> bool;
    fn home_dir(&self) -> Option<PathBuf>;
    fn temp_dir(&self) -> PathBuf;
}

/// Probe backed by the real process environment and filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProbe;

impl EnvironmentProbe for SystemProbe {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }

    fn path_exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn home_dir(&self) -> Option<PathBuf> {
        dirs::home_dir()
    }

    fn temp_dir(&self) -> PathBuf {
        std::env::temp_dir()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signal {
    pub name: &'static str,
    pub fired: bool,
}

/// Outcome of detection, kept for the diagnostics surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentReport {
    pub environment: Environment,
    pub forced: bool,
    pub signals: Vec<Signal>,
}

impl EnvironmentReport {
    pub fn fired_signals(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.signals
            .iter()
            .filter(|signal| signal.fired)
            .map(|signal| signal.name)
    }
}

pub fn detect_environment(probe: &dyn EnvironmentProbe) -> Environment {
    detect_with_policy(probe, DetectionPolicy::default()).environment
}

pub fn detect_with_policy(probe: &dyn EnvironmentProbe, policy: DetectionPolicy) -> EnvironmentReport {
    if let Some(forced) = probe
        .var(FORCE_ENVIRONMENT_VAR)
        .as_deref()
        .and_then(Environment::from_override)
    {
        info!(environment = %forced, "environment forced by {FORCE_ENVIRONMENT_VAR}");
        return EnvironmentReport {
            environment: forced,
            forced: true,
            signals: Vec::new(),
        };
    }

    let signals = collect_signals(probe);
    let fired = signals.iter().filter(|signal| signal.fired).count();
    let environment = if policy.is_sandboxed(fired) {
        Environment::Sandboxed
    } else {
        Environment::Unrestricted
    };

    let report = EnvironmentReport {
        environment,
        forced: false,
        signals,
    };
    info!(
        environment = %environment,
        fired = ?report.fired_signals().collect::<Vec<_>>(),
        "environment detected"
    );
    report
}

fn collect_signals(probe: &dyn EnvironmentProbe) -> Vec<Signal> {
    let local_config_present = probe
        .home_dir()
        .map(|home| probe.path_exists(&home.join(LOCAL_CONFIG_DIR)))
        .unwrap_or(false);
    let temp_dir = probe.temp_dir();

    vec![
        Signal {
            name: "STREAMLIT_SHARING_MODE",
            fired: probe.var("STREAMLIT_SHARING_MODE").is_some(),
        },
        Signal {
            name: "STREAMLIT_SERVER_BASE_URL_IS_SET",
            fired: probe.var("STREAMLIT_SERVER_BASE_URL_IS_SET").is_some(),
        },
        Signal {
            name: "IS_STREAMLIT_CLOUD",
            fired: probe.var("IS_STREAMLIT_CLOUD").as_deref() == Some("true"),
        },
        Signal {
            name: "sandbox config file",
            fired: probe.path_exists(Path::new(SANDBOX_CONFIG_PATH)),
        },
        Signal {
            name: "HOSTNAME prefix",
            fired: probe
                .var("HOSTNAME")
                .is_some_and(|host| host.starts_with(SANDBOX_HOSTNAME_PREFIX)),
        },
        Signal {
            name: "local config dir absent",
            fired: !local_config_present,
        },
        Signal {
            name: "temp dir layout",
            fired: temp_dir.to_string_lossy().contains("/tmp")
                && !probe.path_exists(Path::new("/Users"))
                && !probe.path_exists(Path::new("/home/user")),
        },
    ]
}

/// Proxy-related environment variables currently set, in a stable order.
pub fn proxy_settings(probe: &dyn EnvironmentProbe) -> Vec<(&'static str, String)> {
    PROXY_ENV_VARS
        .iter()
        .filter_map(|key| probe.var(key).map(|value| (*key, value)))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};

    use super::*;

    #[derive(Default)]
    struct FakeProbe {
        vars: BTreeMap<String, String>,
        paths: BTreeSet<PathBuf>,
        temp: Option<PathBuf>,
    }

    impl FakeProbe {
        /// A developer laptop: local config present, no sandbox markers.
        fn local() -> Self {
            let mut probe = Self {
                temp: Some(PathBuf::from("/var/folders/xy/T")),
                ..Self::default()
            };
            probe.paths.insert(PathBuf::from("/home/dev/.streamlit"));
            probe
        }

        fn var(mut self, key: &str, value: &str) -> Self {
            self.vars.insert(key.to_owned(), value.to_owned());
            self
        }

        fn path(mut self, path: &str) -> Self {
            self.paths.insert(PathBuf::from(path));
            self
        }
    }

    impl EnvironmentProbe for FakeProbe {
        fn var(&self, key: &str) -> Option<String> {
            self.vars.get(key).cloned()
        }

        fn path_exists(&self, path: &Path) -> bool {
            self.paths.contains(path)
        }

        fn home_dir(&self) -> Option<PathBuf> {
            Some(PathBuf::from("/home/dev"))
        }

        fn temp_dir(&self) -> PathBuf {
            self.temp.clone().unwrap_or_else(|| PathBuf::from("/tmp"))
        }
    }

    #[test]
    fn local_machine_without_signals_is_unrestricted() {
        assert_eq!(detect_environment(&FakeProbe::local()), Environment::Unrestricted);
    }

    #[test]
    fn any_single_signal_classifies_as_sandboxed() {
        let cases = [
            FakeProbe::local().var("STREAMLIT_SHARING_MODE", "streamlit"),
            FakeProbe::local().var("IS_STREAMLIT_CLOUD", "true"),
            FakeProbe::local().var("HOSTNAME", "st-abc123"),
            FakeProbe::local().path("/.streamlit/config.toml"),
        ];

        for probe in cases {
            assert_eq!(detect_environment(&probe), Environment::Sandboxed);
        }
    }

    #[test]
    fn is_streamlit_cloud_requires_literal_true() {
        let probe = FakeProbe::local().var("IS_STREAMLIT_CLOUD", "false");
        assert_eq!(detect_environment(&probe), Environment::Unrestricted);
    }

    #[test]
    fn missing_local_config_dir_fires() {
        let mut probe = FakeProbe::local();
        probe.paths.clear();
        probe.paths.insert(PathBuf::from("/Users"));

        let report = detect_with_policy(&probe, DetectionPolicy::AnySignal);
        assert_eq!(report.environment, Environment::Sandboxed);
        assert_eq!(
            report.fired_signals().collect::<Vec<_>>(),
            vec!["local config dir absent"]
        );
    }

    #[test]
    fn temp_dir_heuristic_fires_only_without_user_dirs() {
        let mut probe = FakeProbe::local();
        probe.temp = Some(PathBuf::from("/tmp"));
        assert_eq!(detect_environment(&probe), Environment::Sandboxed);

        let probe = {
            let mut probe = FakeProbe::local().path("/home/user");
            probe.temp = Some(PathBuf::from("/tmp"));
            probe
        };
        assert_eq!(detect_environment(&probe), Environment::Unrestricted);
    }

    #[test]
    fn override_wins_over_signals() {
        let probe = FakeProbe::local().var(FORCE_ENVIRONMENT_VAR, "sandboxed");
        let report = detect_with_policy(&probe, DetectionPolicy::AnySignal);
        assert_eq!(report.environment, Environment::Sandboxed);
        assert!(report.forced);

        let probe = FakeProbe::local()
            .var("IS_STREAMLIT_CLOUD", "true")
            .var(FORCE_ENVIRONMENT_VAR, "local");
        assert_eq!(detect_environment(&probe), Environment::Unrestricted);
    }

    #[test]
    fn unknown_override_falls_back_to_detection() {
        let probe = FakeProbe::local().var(FORCE_ENVIRONMENT_VAR, "staging");
        let report = detect_with_policy(&probe, DetectionPolicy::AnySignal);
        assert!(!report.forced);
        assert_eq!(report.environment, Environment::Unrestricted);
    }

    #[test]
    fn threshold_policy_tolerates_a_single_signal() {
        let probe = FakeProbe::local().var("HOSTNAME", "st-abc123");
        let report = detect_with_policy(&probe, DetectionPolicy::AtLeast(2));
        assert_eq!(report.environment, Environment::Unrestricted);

        let probe = probe.var("STREAMLIT_SHARING_MODE", "1");
        let report = detect_with_policy(&probe, DetectionPolicy::AtLeast(2));
        assert_eq!(report.environment, Environment::Sandboxed);
    }

    #[test]
    fn proxy_settings_lists_present_variables_in_order() {
        let probe = FakeProbe::local()
            .var("https_proxy", "http://proxy:3128")
            .var("HTTP_PROXY", "http://proxy:8080");

        assert_eq!(
            proxy_settings(&probe),
            vec![
                ("HTTP_PROXY", "http://proxy:8080".to_owned()),
                ("https_proxy", "http://proxy:3128".to_owned()),
            ]
        );
    }
}
