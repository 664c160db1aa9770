//! Capability matching between waiting workers and stages.

use stagehand_core::{CapabilityFilter, StageDescriptor};

/// Whether a worker advertising `filter` can run `stage`.
///
/// Kind and type must agree after defaulting (`pipeline` / `docker`). OS and
/// arch are only compared when the worker names them.
pub fn matches(filter: &CapabilityFilter, stage: &StageDescriptor) -> bool {
    if filter.effective_kind() != stage.effective_kind() {
        return false;
    }
    if filter.effective_type() != stage.effective_type() {
        return false;
    }
    if !filter.os.is_empty() && filter.os != stage.os {
        return false;
    }
    if !filter.arch.is_empty() && filter.arch != stage.arch {
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use stagehand_core::BuildId;

    fn stage(kind: &str, stage_type: &str, os: &str, arch: &str) -> StageDescriptor {
        let mut stage = StageDescriptor::pending(BuildId::new(), "build");
        stage.kind = kind.to_string();
        stage.stage_type = stage_type.to_string();
        stage.os = os.to_string();
        stage.arch = arch.to_string();
        stage
    }

    fn filter(kind: &str, stage_type: &str, os: &str, arch: &str) -> CapabilityFilter {
        CapabilityFilter {
            kind: kind.to_string(),
            stage_type: stage_type.to_string(),
            os: os.to_string(),
            arch: arch.to_string(),
        }
    }

    #[test]
    fn test_empty_kind_and_type_default_on_both_sides() {
        let linux = stage("", "", "linux", "amd64");
        assert!(matches(&filter("", "", "linux", "amd64"), &linux));
        assert!(matches(&filter("pipeline", "docker", "linux", "amd64"), &linux));

        let explicit = stage("pipeline", "docker", "linux", "amd64");
        assert!(matches(&filter("", "", "linux", "amd64"), &explicit));
    }

    #[test]
    fn test_kind_and_type_are_hard_requirements() {
        let exec = stage("pipeline", "exec", "linux", "amd64");
        assert!(!matches(&filter("", "", "", ""), &exec));
        assert!(matches(&filter("", "exec", "", ""), &exec));

        let other_kind = stage("secret", "", "linux", "amd64");
        assert!(!matches(&filter("", "", "linux", "amd64"), &other_kind));
    }

    #[test]
    fn test_platform_is_checked_only_when_worker_names_it() {
        let arm = stage("", "", "linux", "arm64");
        assert!(matches(&filter("", "", "", ""), &arm));
        assert!(matches(&filter("", "", "linux", ""), &arm));
        assert!(!matches(&filter("", "", "linux", "amd64"), &arm));
        assert!(!matches(&filter("", "", "windows", ""), &arm));

        // A worker that names a platform does not pick up stages that leave
        // it blank.
        let anywhere = stage("", "", "", "");
        assert!(!matches(&filter("", "", "linux", ""), &anywhere));
    }

    #[test]
    fn test_agrees_with_definition_for_all_combinations() {
        let kinds = ["", "pipeline", "secret"];
        let types = ["", "docker", "exec"];
        let oses = ["", "linux", "windows"];
        let arches = ["", "amd64", "arm64"];

        let default_or = |value: &str, default: &'static str| -> String {
            if value.is_empty() {
                default.to_string()
            } else {
                value.to_string()
            }
        };

        for wk in kinds {
            for wt in types {
                for wo in oses {
                    for wa in arches {
                        let f = filter(wk, wt, wo, wa);
                        for sk in kinds {
                            for st in types {
                                for so in oses {
                                    for sa in arches {
                                        let s = stage(sk, st, so, sa);
                                        let expected = default_or(wk, "pipeline")
                                            == default_or(sk, "pipeline")
                                            && default_or(wt, "docker") == default_or(st, "docker")
                                            && (wo.is_empty() || wo == so)
                                            && (wa.is_empty() || wa == sa);
                                        assert_eq!(matches(&f, &s), expected, "{:?} vs {:?}", f, s);
                                        // Repeated calls give the same answer.
                                        assert_eq!(matches(&f, &s), expected);
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
    }
}
