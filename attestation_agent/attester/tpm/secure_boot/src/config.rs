/*
 * Copyright (c) Huawei Technologies Co., Ltd. 2025. All rights reserved.
 * Global Trust Authority is licensed under the Mulan PSL v2.
 * You can use this software according to the terms and conditions of the Mulan PSL v2.
 * You may obtain a copy of Mulan PSL v2 at:
 *     http://license.coscl.org.cn/MulanPSL2
 * THIS SOFTWARE IS PROVIDED ON AN "AS IS" BASIS, WITHOUT WARRANTIES OF ANY KIND, EITHER EXPRESS OR
 * IMPLIED, INCLUDING BUT NOT LIMITED TO NON-INFRINGEMENT, MERCHANTABILITY OR FIT FOR A PARTICULAR
 * PURPOSE.
 * See the Mulan PSL v2 for more details.
 */

//! Declarative description of a predicted boot chain

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use crate::constants::{BOOT_MANAGER_CODE_PCR, DEFAULT_EVENT_LOG_PATH};
use crate::error::EfiImageError;
use crate::load_event::LoadEventSource;

/// Number of PCRs in a TPM 2.0 PC client bank
const PCR_COUNT: u32 = 24;

// Where the bytes of an image live
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum ImageConfig {
    Container(ContainerImageConfig),
    File(FileImageConfig),
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ContainerImageConfig {
    pub container: String,     // Unpacked container directory
    pub member: String,        // Member name relative to the container root
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct FileImageConfig {
    pub file: String,          // Path of the image on disk
}

impl ImageConfig {
    pub fn file(file: impl Into<String>) -> Self {
        ImageConfig::File(FileImageConfig { file: file.into() })
    }

    pub fn container(container: impl Into<String>, member: impl Into<String>) -> Self {
        ImageConfig::Container(ContainerImageConfig { container: container.into(), member: member.into() })
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct EventConfig {
    pub id: String,
    pub source: LoadEventSource,
    pub image: String,         // Key into BootChainConfig::images
    #[serde(default)]
    pub next: Vec<String>,     // Ids of acceptable successor events, empty for a leaf
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct BootChainConfig {
    #[serde(default)]
    pub images: BTreeMap<String, ImageConfig>,
    pub events: Vec<EventConfig>,
    pub roots: Vec<String>,    // Ids of the first loaded images
}

fn default_event_log_path() -> String {
    DEFAULT_EVENT_LOG_PATH.to_string()
}

fn default_pcr_index() -> u32 {
    BOOT_MANAGER_CODE_PCR
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct SecureBootConfig {
    #[serde(default = "default_event_log_path")]
    pub event_log_path: String, // Binary TCG event log, consumed by the digesting stage only
    #[serde(default = "default_pcr_index")]
    pub pcr_index: u32,         // PCR the predicted image loads are extended into
    pub boot_chain: BootChainConfig,
}

impl BootChainConfig {
    pub fn from_json(content: &str) -> Result<Self, EfiImageError> {
        serde_json::from_str(content)
            .map_err(|e| EfiImageError::ConfigError(format!("Failed to parse boot chain as JSON: {}", e)))
    }

    pub fn from_yaml(content: &str) -> Result<Self, EfiImageError> {
        serde_yaml::from_str(content)
            .map_err(|e| EfiImageError::ConfigError(format!("Failed to parse boot chain as YAML: {}", e)))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, EfiImageError> {
        let path = path.as_ref();
        match config_format(path)? {
            ConfigFormat::Json => Self::from_json(&read_config(path)?),
            ConfigFormat::Yaml => Self::from_yaml(&read_config(path)?),
        }
    }

    /// Check the description for shape errors and unresolved references
    ///
    /// Every declared event is checked, including events no root reaches. Cycles are only
    /// detected when the tree is built.
    pub fn validate(&self) -> Result<(), String> {
        self.validate_shape()?;
        self.validate_references()
    }

    pub(crate) fn validate_shape(&self) -> Result<(), String> {
        // 1. Validate roots
        if self.roots.is_empty() {
            return Err("Boot chain must declare at least one root event".to_string());
        }

        // 2. Validate images
        for (name, image) in &self.images {
            if name.is_empty() {
                return Err("Image name cannot be empty".to_string());
            }
            match image {
                ImageConfig::File(FileImageConfig { file }) if file.is_empty() => {
                    return Err(format!("Image {} has an empty file path", name));
                },
                ImageConfig::Container(ContainerImageConfig { container, member }) => {
                    if container.is_empty() {
                        return Err(format!("Image {} has an empty container path", name));
                    }
                    if member.is_empty() {
                        return Err(format!("Image {} has an empty container member", name));
                    }
                },
                _ => {},
            }
        }

        // 3. Validate events
        let mut ids = HashSet::new();
        for (idx, event) in self.events.iter().enumerate() {
            if event.id.is_empty() {
                return Err(format!("Event at index {} has an empty id", idx));
            }
            if !ids.insert(event.id.as_str()) {
                return Err(format!("Duplicate event id: {}", event.id));
            }
        }
        Ok(())
    }

    pub(crate) fn validate_references(&self) -> Result<(), String> {
        let ids: HashSet<&str> = self.events.iter().map(|event| event.id.as_str()).collect();

        for root in &self.roots {
            if !ids.contains(root.as_str()) {
                return Err(format!("Unknown root event: {}", root));
            }
        }
        for event in &self.events {
            if !self.images.contains_key(&event.image) {
                return Err(format!("Load event {} references unknown image {}", event.id, event.image));
            }
            if let Some(next) = event.next.iter().find(|next| !ids.contains(next.as_str())) {
                return Err(format!("Load event {} references unknown successor {}", event.id, next));
            }
        }
        Ok(())
    }
}

impl SecureBootConfig {
    pub fn from_json(content: &str) -> Result<Self, EfiImageError> {
        serde_json::from_str(content)
            .map_err(|e| EfiImageError::ConfigError(format!("Failed to parse secure boot configuration as JSON: {}", e)))
    }

    pub fn from_yaml(content: &str) -> Result<Self, EfiImageError> {
        serde_yaml::from_str(content)
            .map_err(|e| EfiImageError::ConfigError(format!("Failed to parse secure boot configuration as YAML: {}", e)))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, EfiImageError> {
        let path = path.as_ref();
        match config_format(path)? {
            ConfigFormat::Json => Self::from_json(&read_config(path)?),
            ConfigFormat::Yaml => Self::from_yaml(&read_config(path)?),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.event_log_path.is_empty() {
            return Err("Event log path cannot be empty".to_string());
        }
        if self.pcr_index >= PCR_COUNT {
            return Err(format!("PCR index {} is out of range (0-{})", self.pcr_index, PCR_COUNT - 1));
        }
        self.boot_chain.validate()
    }
}

enum ConfigFormat {
    Json,
    Yaml,
}

fn config_format(path: &Path) -> Result<ConfigFormat, EfiImageError> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => Ok(ConfigFormat::Json),
        Some("yaml") | Some("yml") => Ok(ConfigFormat::Yaml),
        _ => Err(EfiImageError::ConfigError(format!(
            "Unsupported configuration file type: {}",
            path.display()
        ))),
    }
}

fn read_config(path: &Path) -> Result<String, EfiImageError> {
    std::fs::read_to_string(path).map_err(|e| {
        EfiImageError::ConfigError(format!("Failed to read configuration file {}: {}", path.display(), e))
    })
}
