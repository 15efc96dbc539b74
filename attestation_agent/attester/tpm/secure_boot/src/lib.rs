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

//! Predicted UEFI secure boot image loads
//!
//! Models the chain of EFI images that firmware and shim load, verify and execute during a
//! measured boot, and gives uniform read access to each image whether it is a file on disk or a
//! member of a container. A sealing stage walks the predicted paths, digests every image and
//! replays the measurements into the boot manager code PCR.

pub mod builder;
pub mod config;
pub mod constants;
mod container_image;
mod error;
mod file_image;
mod image;
mod load_event;

// Public exports
pub use builder::build_tree;
pub use config::{
    BootChainConfig, ContainerImageConfig, EventConfig, FileImageConfig, ImageConfig, SecureBootConfig,
};
pub use constants::{BOOT_MANAGER_CODE_PCR, CERT_TABLE_INDEX, DEFAULT_EVENT_LOG_PATH};
pub use container_image::{ContainerEfiImage, ContainerImageHandle, ContainerReader, DirectoryContainer, MemberHandle};
pub use error::{EfiImageError, HandleOperation};
pub use file_image::{FileEfiImage, FileImageHandle};
pub use image::{with_handle, EfiImage, Image, ImageHandle};
pub use load_event::{LoadEvent, LoadEventSource, LoadEventTree, LoadPath, LoadStep};
