//! The fixed scenario table

use std::fmt;

use serde::{Deserialize, Serialize};

/// Request suffix and the marker the verifier output must contain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestCase {
    pub request_suffix: &'static str,
    pub expected_marker: &'static str,
}

/// Interop scenarios driven through the verifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Scenario {
    /// Plain GET of the site root
    Get,
    /// GET with `TestMethod=POST`: the served page posts back to the site
    PostFlagged,
}

impl Scenario {
    pub const ALL: [Scenario; 2] = [Scenario::Get, Scenario::PostFlagged];

    pub fn test_case(&self) -> TestCase {
        match self {
            Scenario::Get => TestCase {
                request_suffix: "",
                expected_marker: "Interop HTTP/2 GET",
            },
            Scenario::PostFlagged => TestCase {
                request_suffix: "?TestMethod=POST",
                expected_marker: "Interop HTTP/2 POST",
            },
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Scenario::Get => "get",
            Scenario::PostFlagged => "post-flagged",
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table() {
        assert_eq!(Scenario::Get.test_case().request_suffix, "");
        assert_eq!(Scenario::Get.test_case().expected_marker, "Interop HTTP/2 GET");
        assert_eq!(
            Scenario::PostFlagged.test_case().request_suffix,
            "?TestMethod=POST"
        );
        assert_eq!(
            Scenario::PostFlagged.test_case().expected_marker,
            "Interop HTTP/2 POST"
        );
    }

    #[test]
    fn test_names_are_unique() {
        assert_ne!(Scenario::ALL[0].name(), Scenario::ALL[1].name());
    }

    #[test]
    fn test_one_name_everywhere() {
        use clap::ValueEnum;

        for scenario in Scenario::ALL {
            let serde_name = serde_json::to_string(&scenario).unwrap();
            assert_eq!(serde_name, format!("\"{}\"", scenario.name()));

            let value = scenario.to_possible_value().unwrap();
            assert_eq!(value.get_name(), scenario.name());
            assert_eq!(scenario.to_string(), scenario.name());
        }
    }
}
