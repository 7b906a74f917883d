//! Image build and publish models

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::DeployError;

/// A local image build request
///
/// Fields are private so a build cannot be redirected once it has started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSpec {
    image_name: String,
    build_context_path: PathBuf,
    tag: String,
}

impl BuildSpec {
    pub fn new(
        image_name: impl Into<String>,
        build_context_path: impl Into<PathBuf>,
        tag: impl Into<String>,
    ) -> Self {
        Self {
            image_name: image_name.into(),
            build_context_path: build_context_path.into(),
            tag: tag.into(),
        }
    }

    pub fn image_name(&self) -> &str {
        &self.image_name
    }

    pub fn build_context_path(&self) -> &PathBuf {
        &self.build_context_path
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Local reference in `name:tag` form
    pub fn local_tag(&self) -> String {
        format!("{}:{}", self.image_name, self.tag)
    }
}

/// Where a local image ends up in the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishTarget {
    pub account_identifier: String,
    pub region: String,
    pub repository_name: String,
    pub tag: String,
}

impl PublishTarget {
    /// Create a publish target, rejecting repository names the registry would refuse
    pub fn new(
        account_identifier: impl Into<String>,
        region: impl Into<String>,
        repository_name: impl Into<String>,
        tag: impl Into<String>,
    ) -> Result<Self, DeployError> {
        let target = Self {
            account_identifier: account_identifier.into(),
            region: region.into(),
            repository_name: repository_name.into(),
            tag: tag.into(),
        };
        validate_repository_name(&target.repository_name)?;
        validate_tag(&target.tag)?;
        Ok(target)
    }

    /// Registry host for the account and region
    pub fn registry_endpoint(&self) -> String {
        registry_endpoint(&self.account_identifier, &self.region)
    }

    /// Fully qualified `endpoint/repository:tag` reference
    pub fn remote_reference(&self) -> String {
        format!(
            "{}/{}:{}",
            self.registry_endpoint(),
            self.repository_name,
            self.tag
        )
    }
}

pub fn registry_endpoint(account: &str, region: &str) -> String {
    format!("{}.dkr.ecr.{}.amazonaws.com", account, region)
}

pub fn validate_tag(tag: &str) -> Result<(), DeployError> {
    if tag.trim().is_empty() {
        return Err(DeployError::Validation("image tag must not be empty".to_string()));
    }
    Ok(())
}

/// Check a repository name against the registry naming rules
///
/// Names are 2-256 characters of lowercase letters and digits. Path components
/// are separated by `/`, and `.`, `_` or `-` may only appear between two
/// alphanumerics inside a component.
pub fn validate_repository_name(name: &str) -> Result<(), DeployError> {
    let invalid = |reason: &str| {
        Err(DeployError::Validation(format!(
            "invalid repository name '{}': {}",
            name, reason
        )))
    };

    if name.len() < 2 || name.len() > 256 {
        return invalid("length must be between 2 and 256");
    }

    for component in name.split('/') {
        if component.is_empty() {
            return invalid("empty path component");
        }

        let mut prev_separator = true;
        for c in component.chars() {
            match c {
                'a'..='z' | '0'..='9' => prev_separator = false,
                '.' | '_' | '-' => {
                    if prev_separator {
                        return invalid("separator must follow a letter or digit");
                    }
                    prev_separator = true;
                }
                'A'..='Z' => return invalid("uppercase letters are not allowed"),
                _ => return invalid(&format!("character '{}' is not allowed", c)),
            }
        }
        if prev_separator {
            return invalid("component must end with a letter or digit");
        }
    }

    Ok(())
}
