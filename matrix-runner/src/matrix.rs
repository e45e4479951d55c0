//! The default version matrix
//!
//! Nine combinations of runtime host generation and language version, built
//! with the same build-service image and verified through the same HTTP
//! trigger.

use anyhow::Result;
use matrix_core::domain::combination::{Language, RuntimeFamily, VersionCombination};
use matrix_core::domain::config::PipelineConfig;

const RUNTIME_REPOSITORY: &str = "mcr.microsoft.com/azure-functions/mesh";
const HEALTH_PATH: &str = "/api/HttpTrigger";

/// (family, language, language version, image tag suffix)
const CELLS: [(RuntimeFamily, Language, &str, Option<&str>); 9] = [
    (RuntimeFamily::V2, Language::Python, "3.6", None),
    (RuntimeFamily::V2, Language::Python, "3.7", Some("python3.7")),
    (RuntimeFamily::V2, Language::Node, "8", None),
    (RuntimeFamily::V2, Language::Node, "10", Some("node10")),
    (RuntimeFamily::V3, Language::Python, "3.6", None),
    (RuntimeFamily::V3, Language::Python, "3.7", Some("python3.7")),
    (RuntimeFamily::V3, Language::Python, "3.8", Some("python3.8")),
    (RuntimeFamily::V3, Language::Node, "10", None),
    (RuntimeFamily::V3, Language::Node, "12", Some("node12")),
];

/// Builds the default matrix in its declared order
pub fn default_matrix(config: &PipelineConfig) -> Vec<VersionCombination> {
    CELLS
        .iter()
        .map(|(family, language, version, suffix)| {
            let compact = version.replace('.', "");
            let tag = match suffix {
                Some(suffix) => format!("{}-{}", config.runtime_version(*family), suffix),
                None => config.runtime_version(*family).to_string(),
            };

            VersionCombination {
                name: format!(
                    "host{}-{}{}",
                    family.host_label(),
                    language.worker_runtime(),
                    compact
                ),
                family: *family,
                language: *language,
                language_version: version.to_string(),
                source_package: format!("KuduLite{}{}.zip", package_label(*language), compact),
                build_image: config.build_image.clone(),
                runtime_image: format!("{}:{}", RUNTIME_REPOSITORY, tag),
                health_path: HEALTH_PATH.to_string(),
            }
        })
        .collect()
}

fn package_label(language: Language) -> &'static str {
    match language {
        Language::Python => "Python",
        Language::Node => "Node",
    }
}

/// Keeps only the named combinations, preserving matrix order
///
/// An empty filter keeps everything. Unknown names are an error so typos
/// do not silently shrink the run.
pub fn select(matrix: Vec<VersionCombination>, only: &[String]) -> Result<Vec<VersionCombination>> {
    if only.is_empty() {
        return Ok(matrix);
    }

    let unknown: Vec<&str> = only
        .iter()
        .filter(|name| !matrix.iter().any(|c| &c.name == *name))
        .map(String::as_str)
        .collect();
    if !unknown.is_empty() {
        let known: Vec<&str> = matrix.iter().map(|c| c.name.as_str()).collect();
        anyhow::bail!(
            "unknown combination(s): {} (available: {})",
            unknown.join(", "),
            known.join(", ")
        );
    }

    Ok(matrix
        .into_iter()
        .filter(|c| only.contains(&c.name))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::pipeline_config;

    #[test]
    fn test_default_matrix_order_and_images() {
        let matrix = default_matrix(&pipeline_config());
        let names: Vec<&str> = matrix.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "host20-python36",
                "host20-python37",
                "host20-node8",
                "host20-node10",
                "host30-python36",
                "host30-python37",
                "host30-python38",
                "host30-node10",
                "host30-node12",
            ]
        );

        let first = &matrix[0];
        assert_eq!(first.source_package, "KuduLitePython36.zip");
        assert_eq!(first.runtime_image, "mcr.microsoft.com/azure-functions/mesh:2.0.14248");
        assert_eq!(first.build_image, "mcr.microsoft.com/azure-functions/kudulite:kudu-2.11");
        assert_eq!(first.health_path, "/api/HttpTrigger");

        let node12 = &matrix[8];
        assert_eq!(node12.source_package, "KuduLiteNode12.zip");
        assert_eq!(
            node12.runtime_image,
            "mcr.microsoft.com/azure-functions/mesh:3.0.14287-node12"
        );
        assert_eq!(node12.family, RuntimeFamily::V3);
    }

    #[test]
    fn test_select_preserves_matrix_order() {
        let matrix = default_matrix(&pipeline_config());
        let picked = select(
            matrix,
            &["host30-node12".to_string(), "host20-node8".to_string()],
        )
        .unwrap();
        let names: Vec<&str> = picked.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["host20-node8", "host30-node12"]);
    }

    #[test]
    fn test_select_rejects_unknown_names() {
        let matrix = default_matrix(&pipeline_config());
        let err = select(matrix, &["host40-rust".to_string()]).unwrap_err();
        assert!(err.to_string().contains("host40-rust"));
    }
}
