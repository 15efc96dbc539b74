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

//! Load event tree assembly
//!
//! Turns a [`BootChainConfig`] into an owned [`LoadEventTree`]. Events are referenced by id, so a
//! description may share a successor between several parents; the shared event is copied under
//! each of them. Cycles and dangling references are reported as
//! [`EfiImageError::StructuralMisuse`].

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use log::{debug, error, warn};

use crate::config::{BootChainConfig, ContainerImageConfig, EventConfig, FileImageConfig, ImageConfig};
use crate::constants::MAX_LOAD_CHAIN_DEPTH;
use crate::container_image::{ContainerEfiImage, ContainerReader, DirectoryContainer};
use crate::error::EfiImageError;
use crate::file_image::FileEfiImage;
use crate::image::Image;
use crate::load_event::{LoadEvent, LoadEventTree};

/// Upper bound on events in an expanded tree
pub const MAX_TREE_EVENTS: usize = 4096;

struct Expansion<'a> {
    events: HashMap<&'a str, &'a EventConfig>,
    images: HashMap<&'a str, Image>,
    on_path: Vec<&'a str>,
    expanded: usize,
}

/// Build the predicted load event tree described by `config`
pub fn build_tree(config: &BootChainConfig) -> Result<LoadEventTree, EfiImageError> {
    config.validate_shape().map_err(|e| {
        error!("Invalid boot chain description: {}", e);
        EfiImageError::ConfigError(e)
    })?;
    config.validate_references().map_err(|e| {
        error!("Unresolved reference in boot chain description: {}", e);
        EfiImageError::StructuralMisuse(e)
    })?;

    let mut expansion = Expansion {
        events: config.events.iter().map(|event| (event.id.as_str(), event)).collect(),
        images: resolve_images(config),
        on_path: Vec::new(),
        expanded: 0,
    };

    let referenced: BTreeSet<&str> = config.events.iter().map(|event| event.image.as_str()).collect();
    for name in config.images.keys().filter(|name| !referenced.contains(name.as_str())) {
        warn!("Image {} is not referenced by any load event", name);
    }

    let mut tree = LoadEventTree::default();
    for root in &config.roots {
        tree.push_root(expansion.expand(root)?);
    }
    debug!("Built load event tree with {} roots and {} events", config.roots.len(), expansion.expanded);
    Ok(tree)
}

// Images from the same container directory share one reader
fn resolve_images(config: &BootChainConfig) -> HashMap<&str, Image> {
    let mut containers: HashMap<&str, Arc<dyn ContainerReader>> = HashMap::new();
    let mut images = HashMap::new();

    for (name, image) in &config.images {
        let resolved = match image {
            ImageConfig::File(FileImageConfig { file }) => Image::from(FileEfiImage::new(file)),
            ImageConfig::Container(ContainerImageConfig { container, member }) => {
                let reader = containers
                    .entry(container.as_str())
                    .or_insert_with(|| Arc::new(DirectoryContainer::new(container)) as Arc<dyn ContainerReader>)
                    .clone();
                Image::from(ContainerEfiImage::new(reader, container.as_str(), member.as_str()))
            },
        };
        images.insert(name.as_str(), resolved);
    }
    images
}

impl<'a> Expansion<'a> {
    fn expand(&mut self, id: &'a str) -> Result<LoadEvent, EfiImageError> {
        if self.on_path.contains(&id) {
            return Err(EfiImageError::StructuralMisuse(format!(
                "Load event {} is its own successor: {} -> {}",
                id,
                self.on_path.join(" -> "),
                id
            )));
        }
        if self.on_path.len() >= MAX_LOAD_CHAIN_DEPTH {
            return Err(EfiImageError::StructuralMisuse(format!(
                "Load chain through {} exceeds {} events",
                id, MAX_LOAD_CHAIN_DEPTH
            )));
        }
        self.expanded += 1;
        if self.expanded > MAX_TREE_EVENTS {
            return Err(EfiImageError::StructuralMisuse(format!(
                "Expanded load event tree exceeds {} events",
                MAX_TREE_EVENTS
            )));
        }

        let event: &'a EventConfig = self
            .events
            .get(id)
            .copied()
            .ok_or_else(|| EfiImageError::StructuralMisuse(format!("Unknown load event: {}", id)))?;
        let image = self.images.get(event.image.as_str()).cloned().ok_or_else(|| {
            EfiImageError::StructuralMisuse(format!(
                "Load event {} references unknown image {}",
                id, event.image
            ))
        })?;

        let mut node = LoadEvent::new(event.source, image);
        self.on_path.push(id);
        for next in &event.next {
            let child = self.expand(next.as_str())?;
            node.push_next(child);
        }
        self.on_path.pop();
        Ok(node)
    }
}
