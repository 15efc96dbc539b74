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

//! Container backed EFI images
//!
//! The container format itself is owned by the caller. This module only needs a
//! [`ContainerReader`] that opens a named member as a [`MemberHandle`].
//!
//! Size policy: a container image handle reports its size from container metadata through
//! [`MemberHandle::size`]. Readers that cannot provide it keep the default implementation, which
//! fails with `io::ErrorKind::Unsupported` and surfaces as [`EfiImageError::Unsupported`].

use std::fmt::{Debug, Display, Formatter, Result as FmtResult};
use std::fs::File;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use log::debug;

use crate::constants::CONTAINER_IMAGE_PREFIX;
use crate::error::{EfiImageError, HandleOperation};
use crate::file_image::read_file_at;
use crate::image::{EfiImage, ImageHandle};

/// A random access handle to one member of a container
pub trait MemberHandle: Send {
    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> io::Result<usize>;

    /// Member length from container metadata
    fn size(&self) -> io::Result<u64> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "container does not expose member sizes",
        ))
    }

    fn close(self: Box<Self>) -> io::Result<()> {
        Ok(())
    }
}

/// Capability to open named members of a container archive
pub trait ContainerReader: Send + Sync {
    fn open_member(&self, name: &str) -> io::Result<Box<dyn MemberHandle>>;
}

/// A binary contained within a container archive that is loaded, verified and executed before
/// ExitBootServices
#[derive(Clone)]
pub struct ContainerEfiImage {
    container: Arc<dyn ContainerReader>,
    container_path: String,
    member: String,
}

impl ContainerEfiImage {
    /// `container_path` names the container for display purposes only
    pub fn new(
        container: Arc<dyn ContainerReader>,
        container_path: impl Into<String>,
        member: impl Into<String>,
    ) -> Self {
        Self {
            container,
            container_path: container_path.into(),
            member: member.into(),
        }
    }

    pub fn container_path(&self) -> &str {
        &self.container_path
    }

    pub fn member(&self) -> &str {
        &self.member
    }
}

impl Debug for ContainerEfiImage {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("ContainerEfiImage")
            .field("container_path", &self.container_path)
            .field("member", &self.member)
            .finish()
    }
}

impl Display for ContainerEfiImage {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}:{}:{}", CONTAINER_IMAGE_PREFIX, self.container_path, self.member)
    }
}

impl EfiImage for ContainerEfiImage {
    fn open(&self) -> Result<Box<dyn ImageHandle>, EfiImageError> {
        let label = self.to_string();
        let inner = self
            .container
            .open_member(&self.member)
            .map_err(|e| EfiImageError::from_io(label.clone(), HandleOperation::Open, e))?;
        debug!("Opened container image {}", label);
        Ok(Box::new(ContainerImageHandle { inner, image: label }))
    }
}

/// Handle to an open container member
pub struct ContainerImageHandle {
    inner: Box<dyn MemberHandle>,
    image: String,
}

impl ImageHandle for ContainerImageHandle {
    fn image(&self) -> &str {
        &self.image
    }

    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> Result<usize, EfiImageError> {
        self.inner
            .read_at(buf, offset)
            .map_err(|e| EfiImageError::from_io(self.image.clone(), HandleOperation::Read, e))
    }

    fn size(&self) -> Result<u64, EfiImageError> {
        self.inner
            .size()
            .map_err(|e| EfiImageError::from_io(self.image.clone(), HandleOperation::Size, e))
    }

    fn close(self: Box<Self>) -> Result<(), EfiImageError> {
        let ContainerImageHandle { inner, image } = *self;
        debug!("Closing container image {}", image);
        inner
            .close()
            .map_err(|e| EfiImageError::from_io(image, HandleOperation::Close, e))
    }
}

/// A container that has been unpacked into a directory
///
/// Members are paths relative to the root directory. Absolute names and names that climb out of
/// the root are rejected.
#[derive(Debug, Clone)]
pub struct DirectoryContainer {
    root: PathBuf,
}

impl DirectoryContainer {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn member_path(&self, name: &str) -> io::Result<PathBuf> {
        let relative = Path::new(name);
        let contained = relative.components().any(|c| matches!(c, Component::Normal(_)))
            && relative.components().all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !contained {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid container member name: {:?}", name),
            ));
        }
        Ok(self.root.join(relative))
    }
}

impl ContainerReader for DirectoryContainer {
    fn open_member(&self, name: &str) -> io::Result<Box<dyn MemberHandle>> {
        let file = File::open(self.member_path(name)?)?;
        Ok(Box::new(DirectoryMemberHandle { file }))
    }
}

struct DirectoryMemberHandle {
    file: File,
}

impl MemberHandle for DirectoryMemberHandle {
    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        read_file_at(&mut self.file, buf, offset)
    }

    fn size(&self) -> io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }
}
