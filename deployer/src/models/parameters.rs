//! Stack template parameters

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::DeployError;

pub const VPC_ID: &str = "VpcId";
pub const SUBNET_ID: &str = "SubnetId";
pub const S3_BUCKET_NAME: &str = "S3BucketName";
pub const IMAGE_URI: &str = "ImageUri";
pub const DATABASE_NAME: &str = "DatabaseName";
pub const TABLE_NAME: &str = "TableName";
pub const STACK_NAME: &str = "StackName";
pub const REGION: &str = "Region";

pub const MODEL_ID: &str = "ModelId";
pub const MAX_TOKENS: &str = "MaxTokens";
pub const TEMPERATURE: &str = "Temperature";

/// Parameters without a safe default, checked in this order
pub const REQUIRED_KEYS: [&str; 8] = [
    VPC_ID,
    SUBNET_ID,
    S3_BUCKET_NAME,
    IMAGE_URI,
    DATABASE_NAME,
    TABLE_NAME,
    STACK_NAME,
    REGION,
];

/// Template parameters submitted with a stack request
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "ParameterFile")]
pub struct DeploymentParameters {
    values: BTreeMap<String, String>,
}

/// One entry of the `[{"ParameterKey": .., "ParameterValue": ..}]` format
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ParameterEntry {
    pub parameter_key: String,
    pub parameter_value: String,
}

/// Accepted parameter file layouts
#[derive(Deserialize)]
#[serde(untagged)]
enum ParameterFile {
    Entries(Vec<ParameterEntry>),
    Map(BTreeMap<String, String>),
}

impl From<ParameterFile> for DeploymentParameters {
    fn from(file: ParameterFile) -> Self {
        match file {
            ParameterFile::Entries(entries) => entries
                .into_iter()
                .map(|e| (e.parameter_key, e.parameter_value))
                .collect(),
            ParameterFile::Map(values) => Self { values },
        }
    }
}

impl FromIterator<(String, String)> for DeploymentParameters {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

impl DeploymentParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Fill an optional tunable when the caller did not supply one
    pub fn set_default(&mut self, key: &str, value: impl Into<String>) {
        let missing = self.get(key).map_or(true, |v| v.trim().is_empty());
        if missing {
            self.values.insert(key.to_string(), value.into());
        }
    }

    /// Ensure every required key is present and non-empty
    pub fn validate(&self) -> Result<(), DeployError> {
        for key in REQUIRED_KEYS {
            match self.get(key) {
                None => {
                    return Err(DeployError::Validation(format!(
                        "missing required parameter: {}",
                        key
                    )))
                }
                Some(value) if value.trim().is_empty() => {
                    return Err(DeployError::Validation(format!(
                        "required parameter is empty: {}",
                        key
                    )))
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// Parameters in the `ParameterKey`/`ParameterValue` wire format
    pub fn to_entries(&self) -> Vec<ParameterEntry> {
        self.values
            .iter()
            .map(|(k, v)| ParameterEntry {
                parameter_key: k.clone(),
                parameter_value: v.clone(),
            })
            .collect()
    }
}
