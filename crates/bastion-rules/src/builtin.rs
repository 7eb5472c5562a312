//! Built-in rule pack, compiled into the binary.
//!
//! The definitions live under `rules/builtin/` in this crate and use the
//! same YAML format as user-supplied [`declarative`](crate::declarative)
//! rules. Order here is execution order.

use std::path::Path;

use crate::declarative::{DeclarativeError, DeclarativeRule, DeclarativeRuleLoader};

const BUILTIN: &[(&str, &str)] = &[
    ("builtin/F1.yaml", include_str!("../rules/builtin/F1.yaml")),
    ("builtin/F26.yaml", include_str!("../rules/builtin/F26.yaml")),
    ("builtin/W2.yaml", include_str!("../rules/builtin/W2.yaml")),
    ("builtin/W35.yaml", include_str!("../rules/builtin/W35.yaml")),
    ("builtin/W41.yaml", include_str!("../rules/builtin/W41.yaml")),
];

/// Parses the embedded rule definitions.
///
/// # Errors
///
/// Returns a [`DeclarativeError`] if an embedded definition is invalid.
pub fn builtin_rules() -> Result<Vec<DeclarativeRule>, DeclarativeError> {
    BUILTIN
        .iter()
        .map(|(name, yaml)| DeclarativeRuleLoader.load_from_str(yaml, Path::new(name)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AuditRule, ViolationKind};
    use bastion_model::{ModelParser, TemplateParser};

    #[test]
    fn every_builtin_rule_parses() {
        let rules = builtin_rules().unwrap();
        let ids: Vec<&str> = rules.iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec!["F1", "F26", "W2", "W35", "W41"]);
    }

    #[test]
    fn kinds_follow_id_prefix() {
        for rule in builtin_rules().unwrap() {
            let expected = if rule.id().starts_with('F') {
                ViolationKind::Failing
            } else {
                ViolationKind::Warning
            };
            assert_eq!(rule.kind(), expected, "rule {}", rule.id());
        }
    }

    #[test]
    fn compliant_bucket_passes_s3_rules() {
        let model = TemplateParser
            .parse(
                r#"{"Resources": {"B": {"Type": "AWS::S3::Bucket", "Properties": {
                    "BucketEncryption": {"ServerSideEncryptionConfiguration": []},
                    "LoggingConfiguration": {"DestinationBucketName": "logs"}
                }}}}"#,
                None,
            )
            .unwrap();

        for rule in builtin_rules().unwrap() {
            assert!(rule.audit(&model).unwrap().is_empty(), "rule {}", rule.id());
        }
    }
}
