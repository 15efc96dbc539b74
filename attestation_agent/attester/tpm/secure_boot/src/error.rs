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

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::io;
use thiserror::Error;

/// Operation performed on an image when an error occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleOperation {
    Open,
    Read,
    Size,
    Close,
}

impl Display for HandleOperation {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            HandleOperation::Open => write!(f, "open"),
            HandleOperation::Read => write!(f, "read"),
            HandleOperation::Size => write!(f, "size"),
            HandleOperation::Close => write!(f, "close"),
        }
    }
}

/// Errors produced while opening images or assembling load event trees
#[derive(Error, Debug)]
pub enum EfiImageError {
    /// Backing path or container member does not exist
    #[error("Image not found: {image} ({operation}): {source}")]
    NotFound {
        image: String,
        operation: HandleOperation,
        #[source]
        source: io::Error,
    },

    /// Read, stat or close failure reported by the backend
    #[error("I/O error on image {image} ({operation}): {source}")]
    Io {
        image: String,
        operation: HandleOperation,
        #[source]
        source: io::Error,
    },

    /// The backend cannot provide the requested operation
    #[error("Unsupported operation on image {image} ({operation}): {source}")]
    Unsupported {
        image: String,
        operation: HandleOperation,
        #[source]
        source: io::Error,
    },

    /// Cycle, dangling reference or runaway depth in a load event description
    #[error("Structural misuse: {0}")]
    StructuralMisuse(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl EfiImageError {
    /// Classify an I/O error raised by an adapter, keeping the original error as the source.
    pub fn from_io(image: impl Into<String>, operation: HandleOperation, source: io::Error) -> Self {
        let image = image.into();
        match source.kind() {
            io::ErrorKind::NotFound => EfiImageError::NotFound { image, operation, source },
            io::ErrorKind::Unsupported => EfiImageError::Unsupported { image, operation, source },
            _ => EfiImageError::Io { image, operation, source },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, EfiImageError::NotFound { .. })
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, EfiImageError::Unsupported { .. })
    }
}
