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

//! EFI image abstraction
//!
//! An EFI image is a binary that is loaded, verified and executed before ExitBootServices.
//! Images are described by a display label and opened into an [`ImageHandle`] that provides
//! random access reads, a size query and an explicit release.
//!
//! Two backends exist:
//! - [`FileEfiImage`]: a file on disk
//! - [`ContainerEfiImage`]: a member of a container archive

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::io;

use log::{debug, warn};
use scopeguard::ScopeGuard;

use crate::container_image::ContainerEfiImage;
use crate::error::{EfiImageError, HandleOperation};
use crate::file_image::FileEfiImage;

/// Chunk size used when the image length cannot be queried up front
const READ_CHUNK_SIZE: usize = 64 * 1024;

/// An open, exclusively owned handle to the bytes of an image
pub trait ImageHandle: Send {
    /// Display label of the image this handle was opened from
    fn image(&self) -> &str;

    /// Read bytes starting at `offset` into `buf`
    ///
    /// Returns the number of bytes read. `0` means the offset is at or past the end of the image.
    /// Short reads are allowed.
    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> Result<usize, EfiImageError>;

    /// Current length of the image in bytes
    fn size(&self) -> Result<u64, EfiImageError>;

    /// Release the handle
    fn close(self: Box<Self>) -> Result<(), EfiImageError>;

    /// Fill `buf` completely from `offset`, failing if the image ends first
    fn read_exact_at(&mut self, mut buf: &mut [u8], mut offset: u64) -> Result<(), EfiImageError> {
        while !buf.is_empty() {
            let n = self.read_at(buf, offset)?;
            if n == 0 {
                return Err(EfiImageError::Io {
                    image: self.image().to_string(),
                    operation: HandleOperation::Read,
                    source: io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!("image ended at offset {} with {} bytes outstanding", offset, buf.len()),
                    ),
                });
            }
            let rest = buf;
            buf = &mut rest[n..];
            offset += n as u64;
        }
        Ok(())
    }

    /// Read the whole image
    ///
    /// Uses `size()` to allocate once; falls back to chunked reads until end of image when the
    /// backend cannot report a size.
    fn read_to_end(&mut self) -> Result<Vec<u8>, EfiImageError> {
        match self.size() {
            Ok(size) => {
                let len = usize::try_from(size).map_err(|_| EfiImageError::Io {
                    image: self.image().to_string(),
                    operation: HandleOperation::Size,
                    source: io::Error::new(io::ErrorKind::OutOfMemory, format!("image size {} does not fit in memory", size)),
                })?;
                let mut data = vec![0u8; len];
                self.read_exact_at(&mut data, 0)?;
                Ok(data)
            },
            Err(e) if e.is_unsupported() => {
                let mut data = Vec::new();
                let mut chunk = vec![0u8; READ_CHUNK_SIZE];
                loop {
                    let n = self.read_at(&mut chunk, data.len() as u64)?;
                    if n == 0 {
                        break;
                    }
                    data.extend_from_slice(&chunk[..n]);
                }
                Ok(data)
            },
            Err(e) => Err(e),
        }
    }
}

/// A binary that participates in the predicted boot chain
///
/// `Display` gives a stable, human-readable location used for diagnostics only. Every call to
/// `open` returns an independent handle and never modifies the backing storage.
pub trait EfiImage: Display + Send + Sync {
    fn open(&self) -> Result<Box<dyn ImageHandle>, EfiImageError>;
}

/// The closed set of image backends a load event can reference
#[derive(Debug, Clone)]
pub enum Image {
    File(FileEfiImage),
    Container(ContainerEfiImage),
}

impl Display for Image {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Image::File(image) => Display::fmt(image, f),
            Image::Container(image) => Display::fmt(image, f),
        }
    }
}

impl EfiImage for Image {
    fn open(&self) -> Result<Box<dyn ImageHandle>, EfiImageError> {
        match self {
            Image::File(image) => image.open(),
            Image::Container(image) => image.open(),
        }
    }
}

impl From<FileEfiImage> for Image {
    fn from(image: FileEfiImage) -> Self {
        Image::File(image)
    }
}

impl From<ContainerEfiImage> for Image {
    fn from(image: ContainerEfiImage) -> Self {
        Image::Container(image)
    }
}

/// Open `image`, run `f` on the handle and close it on every exit path
///
/// An error from `f` takes precedence over an error from closing the handle. If `f` panics the
/// handle is still closed during unwinding.
pub fn with_handle<I, T, F>(image: &I, f: F) -> Result<T, EfiImageError>
where
    I: EfiImage + ?Sized,
    F: FnOnce(&mut dyn ImageHandle) -> Result<T, EfiImageError>,
{
    let handle = image.open()?;
    let mut guard = scopeguard::guard(handle, |handle| {
        let label = handle.image().to_string();
        if let Err(e) = handle.close() {
            warn!("Failed to close image {} during unwind: {}", label, e);
        }
    });

    let result = f(&mut **guard);
    let handle = ScopeGuard::into_inner(guard);
    let closed = handle.close();

    match (result, closed) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(close_err)) => Err(close_err),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(close_err)) => {
            debug!("Ignoring close failure after earlier error: {}", close_err);
            Err(e)
        },
    }
}
