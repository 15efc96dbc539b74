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

//! Predicted image load events
//!
//! A [`LoadEvent`] is one predicted load-verify-execute step. Its `next` list holds every image
//! that is an acceptable continuation, so a tree of events describes all predicted boot paths.
//! Each root-to-leaf path is one complete boot sequence that a digesting stage replays into
//! [`BOOT_MANAGER_CODE_PCR`](crate::constants::BOOT_MANAGER_CODE_PCR).
//!
//! Children are owned by their parent, so a cycle cannot be built through this API. The order of
//! `next` is insertion order only and carries no preference.

use std::fmt::{Display, Formatter, Result as FmtResult};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::image::Image;

/// Component that verified and executed an image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadEventSource {
    /// Loaded through EFI_BOOT_SERVICES.LoadImage() and StartImage(), verified against the
    /// authorized signature database
    Firmware,

    /// Loaded and executed directly by shim, verified against the authorized signature
    /// database, the MOK database or shim's built-in vendor certificate
    Shim,
}

impl Display for LoadEventSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            LoadEventSource::Firmware => write!(f, "firmware"),
            LoadEventSource::Shim => write!(f, "shim"),
        }
    }
}

/// Execution of a verified image and its possible successors
#[derive(Debug, Clone)]
pub struct LoadEvent {
    pub source: LoadEventSource,
    pub image: Image,
    pub next: Vec<LoadEvent>,
}

impl LoadEvent {
    pub fn new(source: LoadEventSource, image: impl Into<Image>) -> Self {
        Self {
            source,
            image: image.into(),
            next: Vec::new(),
        }
    }

    pub fn with_next(mut self, next: impl IntoIterator<Item = LoadEvent>) -> Self {
        self.next.extend(next);
        self
    }

    pub fn push_next(&mut self, event: LoadEvent) {
        self.next.push(event);
    }

    /// A leaf is presumed to be where execution ends, e.g. the kernel
    pub fn is_leaf(&self) -> bool {
        self.next.is_empty()
    }

    /// Every path from this event to a leaf, depth first in insertion order
    pub fn paths(&self) -> Vec<LoadPath<'_>> {
        let mut paths = Vec::new();
        collect_paths(self, &mut paths);
        paths
    }

    fn count(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self];
        while let Some(event) = stack.pop() {
            count += 1;
            stack.extend(event.next.iter());
        }
        count
    }
}

/// One step of a predicted boot path
#[derive(Debug, Clone, Copy)]
pub struct LoadStep<'a> {
    pub source: LoadEventSource,
    pub image: &'a Image,
}

/// An ordered root-to-leaf sequence of load steps
#[derive(Debug, Clone, Default)]
pub struct LoadPath<'a> {
    steps: Vec<LoadStep<'a>>,
}

impl<'a> LoadPath<'a> {
    pub fn steps(&self) -> &[LoadStep<'a>] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn images(&self) -> Vec<&'a Image> {
        self.steps.iter().map(|step| step.image).collect()
    }

    pub fn sources(&self) -> Vec<LoadEventSource> {
        self.steps.iter().map(|step| step.source).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LoadStep<'a>> {
        self.steps.iter()
    }
}

impl Display for LoadPath<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "[")?;
        for (i, step) in self.steps.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", step.image)?;
        }
        write!(f, "]")
    }
}

/// The full set of predicted load events, starting from one or more entry points
#[derive(Debug, Clone, Default)]
pub struct LoadEventTree {
    roots: Vec<LoadEvent>,
}

impl LoadEventTree {
    pub fn new(roots: Vec<LoadEvent>) -> Self {
        Self { roots }
    }

    pub fn push_root(&mut self, root: LoadEvent) {
        self.roots.push(root);
    }

    pub fn roots(&self) -> &[LoadEvent] {
        &self.roots
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Total number of load events across all roots
    pub fn event_count(&self) -> usize {
        self.roots.iter().map(LoadEvent::count).sum()
    }

    /// Every root-to-leaf path, roots in order, each root enumerated depth first
    ///
    /// Two calls on the same tree return the same paths in the same order.
    pub fn paths(&self) -> Vec<LoadPath<'_>> {
        let mut paths = Vec::new();
        for root in &self.roots {
            collect_paths(root, &mut paths);
        }
        debug!("Enumerated {} predicted boot paths from {} roots", paths.len(), self.roots.len());
        paths
    }
}

// Iterative pre-order walk. Children are pushed in reverse so they pop in insertion order.
// Owned children rule out cycles, so the walk always terminates.
fn collect_paths<'a>(root: &'a LoadEvent, paths: &mut Vec<LoadPath<'a>>) {
    let mut current: Vec<LoadStep<'a>> = Vec::new();
    let mut stack: Vec<(&'a LoadEvent, usize)> = vec![(root, 0)];

    while let Some((event, depth)) = stack.pop() {
        current.truncate(depth);
        current.push(LoadStep {
            source: event.source,
            image: &event.image,
        });

        if event.is_leaf() {
            paths.push(LoadPath { steps: current.clone() });
        } else {
            stack.extend(event.next.iter().rev().map(|next| (next, depth + 1)));
        }
    }
}
