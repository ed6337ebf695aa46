use std::path::PathBuf;

/// Comma and/or space separated CIDR ranges to pick source addresses from.
pub const RANDOM_RANGES_VAR: &str = "FREEBIND_RANDOM";
/// `tracing` filter directives, logging stays off unless set.
pub const LOG_VAR: &str = "FREEBIND_LOG";
/// Directory for an additional log file, only honoured together with [LOG_VAR].
pub const LOG_DIR_VAR: &str = "FREEBIND_LOG_DIR";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShimConfig {
    pub random_ranges: Option<String>,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogConfig {
    pub directives: Option<String>,
    pub file_dir: Option<PathBuf>,
}

impl ShimConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from an arbitrary variable source, blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_blank = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        Self {
            random_ranges: non_blank(RANDOM_RANGES_VAR),
            log: LogConfig {
                directives: non_blank(LOG_VAR),
                file_dir: non_blank(LOG_DIR_VAR).map(PathBuf::from),
            },
        }
    }

    pub fn with_ranges(ranges: impl Into<String>) -> Self {
        Self {
            random_ranges: Some(ranges.into()),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn absent_variables() {
        assert_eq!(ShimConfig::from_lookup(lookup(&[])), ShimConfig::default());
    }

    #[test]
    fn blank_counts_as_absent() {
        let conf = ShimConfig::from_lookup(lookup(&[(RANDOM_RANGES_VAR, "   "), (LOG_VAR, "")]));
        assert_eq!(conf.random_ranges, None);
        assert_eq!(conf.log.directives, None);
    }

    #[test]
    fn all_variables() {
        let conf = ShimConfig::from_lookup(lookup(&[
            (RANDOM_RANGES_VAR, "10.0.0.0/8, 2001:db8::/32"),
            (LOG_VAR, "freebind=debug"),
            (LOG_DIR_VAR, "/tmp/logs"),
        ]));

        assert_eq!(conf.random_ranges.as_deref(), Some("10.0.0.0/8, 2001:db8::/32"));
        assert_eq!(conf.log.directives.as_deref(), Some("freebind=debug"));
        assert_eq!(conf.log.file_dir, Some(PathBuf::from("/tmp/logs")));
    }
}
