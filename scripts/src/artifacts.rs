//! Lookup of compiled contracts in a Hardhat artifacts directory

use std::{fs, path::PathBuf};

use alloy_primitives::Bytes;
use serde::Deserialize;
use walkdir::WalkDir;

use crate::{
    constants::ARTIFACT_EXTENSION,
    errors::DeployError,
};

/// The fields of a Hardhat artifact needed for deployment
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HardhatArtifact {
    /// The name of the contract
    pub contract_name: String,
    /// The contract's creation code
    pub bytecode: Bytes,
}

/// A Hardhat artifacts directory, laid out as `<root>/**/<Name>.sol/<Name>.json`
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    /// The root of the artifacts directory
    root: PathBuf,
}

impl ArtifactStore {
    /// An artifact store rooted at the given directory
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Load the artifact for the named contract
    pub fn load(&self, name: &str) -> Result<HardhatArtifact, DeployError> {
        let file_name = format!("{name}.{ARTIFACT_EXTENSION}");
        let matches = self.find_files(&file_name)?;

        let path = match matches.as_slice() {
            [path] => path,
            [] => {
                return Err(DeployError::config(format!(
                    "no artifact for `{name}` under {}",
                    self.root.display()
                )))
            }
            _ => {
                return Err(DeployError::config(format!(
                    "{} artifacts named `{name}` under {}",
                    matches.len(),
                    self.root.display()
                )))
            }
        };

        let contents = fs::read_to_string(path)
            .map_err(|e| DeployError::config(format!("reading {}: {e}", path.display())))?;
        let artifact: HardhatArtifact = serde_json::from_str(&contents)
            .map_err(|e| DeployError::config(format!("parsing {}: {e}", path.display())))?;

        if artifact.contract_name != name {
            return Err(DeployError::config(format!(
                "{} contains `{}`, expected `{name}`",
                path.display(),
                artifact.contract_name
            )));
        }
        if artifact.bytecode.is_empty() {
            return Err(DeployError::config(format!(
                "`{name}` has no creation code (abstract contract or interface?)"
            )));
        }

        Ok(artifact)
    }

    /// Every file under the root with the given name
    fn find_files(&self, file_name: &str) -> Result<Vec<PathBuf>, DeployError> {
        let mut matches = Vec::new();
        for entry in WalkDir::new(&self.root) {
            let entry = entry.map_err(|e| {
                DeployError::config(format!("reading {}: {e}", self.root.display()))
            })?;
            if entry.file_type().is_file() && entry.file_name() == file_name {
                matches.push(entry.into_path());
            }
        }

        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::ArtifactStore;

    fn write_artifact(root: &std::path::Path, dir: &str, name: &str, bytecode: &str) {
        let dir = root.join(dir).join(format!("{name}.sol"));
        fs::create_dir_all(&dir).unwrap();
        let json = format!(
            r#"{{ "_format": "hh-sol-artifact-1", "contractName": "{name}", "abi": [], "bytecode": "{bytecode}", "deployedBytecode": "0x" }}"#
        );
        fs::write(dir.join(format!("{name}.json")), json).unwrap();
        fs::write(dir.join(format!("{name}.dbg.json")), "{}").unwrap();
    }

    #[test]
    fn test_load_nested_artifact() {
        let root = tempfile::tempdir().unwrap();
        write_artifact(root.path(), "contracts", "Swap", "0x6080604052");
        write_artifact(
            root.path(),
            "@openzeppelin/contracts/proxy/transparent",
            "TransparentUpgradeableProxy",
            "0x60806040",
        );

        let store = ArtifactStore::new(root.path());
        let swap = store.load("Swap").unwrap();
        assert_eq!(swap.bytecode.to_vec(), vec![0x60u8, 0x80, 0x60, 0x40, 0x52]);
        store.load("TransparentUpgradeableProxy").unwrap();
    }

    #[test]
    fn test_missing_artifact() {
        let root = tempfile::tempdir().unwrap();
        write_artifact(root.path(), "contracts", "Swap", "0x6080604052");

        let err = ArtifactStore::new(root.path()).load("MarketPlace").unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_duplicate_artifacts_are_ambiguous() {
        let root = tempfile::tempdir().unwrap();
        write_artifact(root.path(), "contracts", "Swap", "0x6080604052");
        write_artifact(root.path(), "contracts/legacy", "Swap", "0x6080604052");

        let err = ArtifactStore::new(root.path()).load("Swap").unwrap_err();
        assert!(err.to_string().contains("2 artifacts"));
    }

    #[test]
    fn test_missing_root() {
        let root = tempfile::tempdir().unwrap();
        let err = ArtifactStore::new(root.path().join("missing")).load("Swap").unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_interface_has_no_bytecode() {
        let root = tempfile::tempdir().unwrap();
        write_artifact(root.path(), "contracts", "ISwap", "0x");

        assert!(ArtifactStore::new(root.path()).load("ISwap").is_err());
    }
}
