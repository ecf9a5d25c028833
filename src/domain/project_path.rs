//! Maps a project directory name back to the working directory it was
//! recorded for.
//!
//! The writer names project directories by replacing every non-alphanumeric
//! character of the absolute path with `-`, so `/Volumes/DevM.2/app` and
//! `/Volumes/DevM/2/app` encode identically. A `cwd` recorded in the log is
//! therefore authoritative; decoding the name is a fallback that only gets
//! real paths right for the prefixes it has been told about.

use crate::domain::LogEntry;

const ENCODED_SEPARATOR: char = '-';

#[derive(Clone, Debug, Eq, PartialEq)]
struct PrefixRule {
    encoded: String,
    segments: Vec<String>,
}

impl PrefixRule {
    fn from_path(path: &str) -> Option<Self> {
        let segments = split_path_segments(path);
        if segments.is_empty() {
            return None;
        }
        let encoded = encode_project_path(path)
            .trim_matches(ENCODED_SEPARATOR)
            .to_string();
        Some(Self { encoded, segments })
    }

    /// Remainder of `name` after this prefix, if the prefix covers whole
    /// encoded segments.
    fn strip<'a>(&self, name: &'a str) -> Option<&'a str> {
        let rest = name.strip_prefix(self.encoded.as_str())?;
        if rest.is_empty() || rest.starts_with(ENCODED_SEPARATOR) {
            Some(rest)
        } else {
            None
        }
    }
}

/// Known real paths used when decoding directory names. The home directory
/// is always one of them.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PathRules {
    home_segments: Vec<String>,
    prefixes: Vec<PrefixRule>,
}

impl PathRules {
    pub fn new(home: Option<&str>, prefixes: &[String]) -> Self {
        let mut rules = Self::default();
        if let Some(home) = home {
            rules.home_segments = split_path_segments(home);
            rules.prefixes.extend(PrefixRule::from_path(home));
        }
        for prefix in prefixes {
            rules.prefixes.extend(PrefixRule::from_path(prefix));
        }
        rules
    }

    fn longest_match<'a>(&self, name: &'a str) -> Option<(&PrefixRule, &'a str)> {
        self.prefixes
            .iter()
            .filter_map(|rule| rule.strip(name).map(|rest| (rule, rest)))
            .max_by_key(|(rule, _)| rule.encoded.len())
    }
}

pub fn encode_project_path(path: &str) -> String {
    path.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c
            } else {
                ENCODED_SEPARATOR
            }
        })
        .collect()
}

pub fn split_path_segments(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect()
}

/// Path segments for a project: the first sampled `cwd`, otherwise the
/// decoded directory name.
pub fn resolve_project_segments<'a>(
    project_dir_name: &str,
    sample: impl IntoIterator<Item = &'a LogEntry>,
    rules: &PathRules,
) -> Vec<String> {
    if let Some(cwd) = sample.into_iter().find_map(LogEntry::non_empty_cwd) {
        let segments = split_path_segments(cwd);
        if !segments.is_empty() {
            return segments;
        }
    }
    decode_project_dir_name(project_dir_name, rules)
}

pub fn decode_project_dir_name(project_dir_name: &str, rules: &PathRules) -> Vec<String> {
    let cleaned = project_dir_name
        .strip_prefix(ENCODED_SEPARATOR)
        .unwrap_or(project_dir_name);
    if cleaned.is_empty() {
        return rules.home_segments.clone();
    }

    if let Some((rule, rest)) = rules.longest_match(cleaned) {
        let mut segments = rule.segments.clone();
        segments.extend(split_encoded(rest));
        return segments;
    }

    split_encoded(cleaned)
}

fn split_encoded(name: &str) -> Vec<String> {
    name.split(ENCODED_SEPARATOR)
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segments(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| (*v).to_string()).collect()
    }

    fn entry_with_cwd(cwd: Option<&str>) -> LogEntry {
        LogEntry {
            cwd: cwd.map(str::to_string),
            ..LogEntry::default()
        }
    }

    #[test]
    fn recorded_cwd_bypasses_name_decoding() {
        let rules = PathRules::new(Some("/Users/alice"), &[]);
        let sample = [
            entry_with_cwd(None),
            entry_with_cwd(Some("  ")),
            entry_with_cwd(Some("/Users/alice/my-app")),
        ];
        assert_eq!(
            resolve_project_segments("-Users-alice-my-app", &sample, &rules),
            segments(&["Users", "alice", "my-app"])
        );
    }

    #[test]
    fn plain_names_split_on_separator() {
        let rules = PathRules::default();
        assert_eq!(
            decode_project_dir_name("-Users-alice-proj", &rules),
            segments(&["Users", "alice", "proj"])
        );
        assert_eq!(
            decode_project_dir_name("srv--data-x", &rules),
            segments(&["srv", "data", "x"])
        );
    }

    #[test]
    fn configured_prefix_restores_dotted_segments() {
        let rules = PathRules::new(None, &["/Volumes/DevM.2".to_string()]);
        assert_eq!(
            decode_project_dir_name("-Volumes-DevM-2-projects-web", &rules),
            segments(&["Volumes", "DevM.2", "projects", "web"])
        );
        assert_eq!(
            decode_project_dir_name("-Volumes-DevM-2", &rules),
            segments(&["Volumes", "DevM.2"])
        );
    }

    #[test]
    fn trailing_slash_on_a_prefix_is_ignored() {
        let rules = PathRules::new(Some("/home/first.last/"), &["/Volumes/DevM.2/".to_string()]);
        assert_eq!(
            decode_project_dir_name("-Volumes-DevM-2-web", &rules),
            segments(&["Volumes", "DevM.2", "web"])
        );
        assert_eq!(
            decode_project_dir_name("-home-first-last-app", &rules),
            segments(&["home", "first.last", "app"])
        );
    }

    #[test]
    fn prefix_must_end_on_a_segment_boundary() {
        let rules = PathRules::new(None, &["/Volumes/Dev".to_string()]);
        assert_eq!(
            decode_project_dir_name("-Volumes-DevM-2", &rules),
            segments(&["Volumes", "DevM", "2"])
        );
    }

    #[test]
    fn home_directory_is_an_implicit_prefix() {
        let rules = PathRules::new(Some("/home/first.last"), &[]);
        assert_eq!(
            decode_project_dir_name("-home-first-last-code", &rules),
            segments(&["home", "first.last", "code"])
        );
    }

    #[test]
    fn longest_prefix_wins() {
        let rules = PathRules::new(
            Some("/Users/alice"),
            &["/Users/alice/work.d".to_string()],
        );
        assert_eq!(
            decode_project_dir_name("-Users-alice-work-d-api", &rules),
            segments(&["Users", "alice", "work.d", "api"])
        );
    }

    #[test]
    fn empty_or_root_name_maps_to_home() {
        let rules = PathRules::new(Some("/Users/alice"), &[]);
        assert_eq!(decode_project_dir_name("", &rules), segments(&["Users", "alice"]));
        assert_eq!(decode_project_dir_name("-", &rules), segments(&["Users", "alice"]));
    }

    #[test]
    fn encodes_like_the_log_writer() {
        assert_eq!(
            encode_project_path("/Volumes/DevM.2/my_app"),
            "-Volumes-DevM-2-my-app"
        );
    }
}
