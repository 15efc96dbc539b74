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

//! File backed EFI images

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use log::debug;

use crate::error::{EfiImageError, HandleOperation};
use crate::image::{EfiImage, ImageHandle};

/// A file on disk that is loaded, verified and executed before ExitBootServices
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEfiImage {
    path: PathBuf,
}

impl FileEfiImage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Display for FileEfiImage {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.path.display())
    }
}

impl EfiImage for FileEfiImage {
    fn open(&self) -> Result<Box<dyn ImageHandle>, EfiImageError> {
        let label = self.to_string();
        let file = File::open(&self.path)
            .map_err(|e| EfiImageError::from_io(label.clone(), HandleOperation::Open, e))?;
        debug!("Opened file image {}", label);
        Ok(Box::new(FileImageHandle { file, image: label }))
    }
}

/// Handle to an open file image
#[derive(Debug)]
pub struct FileImageHandle {
    file: File,
    image: String,
}

impl ImageHandle for FileImageHandle {
    fn image(&self) -> &str {
        &self.image
    }

    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> Result<usize, EfiImageError> {
        read_file_at(&mut self.file, buf, offset)
            .map_err(|e| EfiImageError::from_io(self.image.clone(), HandleOperation::Read, e))
    }

    // Queried from file metadata on every call, so growth after open is visible
    fn size(&self) -> Result<u64, EfiImageError> {
        self.file
            .metadata()
            .map(|metadata| metadata.len())
            .map_err(|e| EfiImageError::from_io(self.image.clone(), HandleOperation::Size, e))
    }

    fn close(self: Box<Self>) -> Result<(), EfiImageError> {
        debug!("Closing file image {}", self.image);
        drop(self.file);
        Ok(())
    }
}

/// Positional read that leaves any shared cursor untouched where the platform allows it
#[cfg(unix)]
pub(crate) fn read_file_at(file: &mut File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::os::unix::fs::FileExt;
    file.read_at(buf, offset)
}

#[cfg(windows)]
pub(crate) fn read_file_at(file: &mut File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::os::windows::fs::FileExt;
    file.seek_read(buf, offset)
}

#[cfg(not(any(unix, windows)))]
pub(crate) fn read_file_at(file: &mut File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::io::{Read, Seek, SeekFrom};
    file.seek(SeekFrom::Start(offset))?;
    file.read(buf)
}
