//! Reserved collection names (system/internal indices).

/// Predicate over collection names.
///
/// A name is reserved when it starts with any configured prefix. The default
/// prefix `.` covers hidden/system indices such as `.kibana` or
/// `.opendistro-job-scheduler-lock`.
#[derive(Clone, Debug)]
pub struct ReservedNames {
    prefixes: Vec<String>,
}

impl Default for ReservedNames {
    fn default() -> Self {
        Self::new([".".to_string()])
    }
}

impl ReservedNames {
    pub fn new(prefixes: impl IntoIterator<Item = String>) -> Self {
        Self {
            prefixes: prefixes.into_iter().filter(|p| !p.is_empty()).collect(),
        }
    }

    pub fn is_reserved(&self, name: &str) -> bool {
        self.prefixes.iter().any(|p| name.starts_with(p.as_str()))
    }

    /// Keeps non-reserved names, sorted and deduplicated.
    pub fn retain_eligible(&self, names: impl IntoIterator<Item = String>) -> Vec<String> {
        let mut out: Vec<String> = names
            .into_iter()
            .filter(|n| !n.is_empty() && !self.is_reserved(n))
            .collect();
        out.sort();
        out.dedup();
        out
    }
}
