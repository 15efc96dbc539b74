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

use std::collections::HashMap;
use std::fs;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use mockall::mock;
use mockall::predicate::eq;
use tempfile::tempdir;
use tpm_secure_boot::{
    with_handle, ContainerEfiImage, ContainerReader, DirectoryContainer, EfiImage, EfiImageError,
    HandleOperation, Image, MemberHandle,
};

mock! {
    pub Container {}
    impl ContainerReader for Container {
        fn open_member(&self, name: &str) -> io::Result<Box<dyn MemberHandle>>;
    }
}

/// In-memory container; member sizes are only reported when `with_sizes` is set
struct MemoryContainer {
    members: HashMap<String, Arc<Vec<u8>>>,
    with_sizes: bool,
    fail_close: bool,
    closed: Arc<AtomicUsize>,
}

struct MemoryMember {
    data: Arc<Vec<u8>>,
    with_sizes: bool,
    fail_close: bool,
    closed: Arc<AtomicUsize>,
}

impl MemoryContainer {
    fn new(members: &[(&str, &[u8])], with_sizes: bool) -> Self {
        Self {
            members: members
                .iter()
                .map(|(name, data)| (name.to_string(), Arc::new(data.to_vec())))
                .collect(),
            with_sizes,
            fail_close: false,
            closed: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Member handles count the close attempt, then report an I/O failure
    fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }
}

impl ContainerReader for MemoryContainer {
    fn open_member(&self, name: &str) -> io::Result<Box<dyn MemberHandle>> {
        let data = self
            .members
            .get(name)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("no member {}", name)))?;
        Ok(Box::new(MemoryMember {
            data,
            with_sizes: self.with_sizes,
            fail_close: self.fail_close,
            closed: self.closed.clone(),
        }))
    }
}

impl MemberHandle for MemoryMember {
    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        let start = (offset as usize).min(self.data.len());
        let n = buf.len().min(self.data.len() - start);
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        Ok(n)
    }

    fn size(&self) -> io::Result<u64> {
        if self.with_sizes {
            Ok(self.data.len() as u64)
        } else {
            Err(io::Error::new(io::ErrorKind::Unsupported, "sizes not recorded"))
        }
    }

    fn close(self: Box<Self>) -> io::Result<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        if self.fail_close {
            return Err(io::Error::new(io::ErrorKind::Other, "squashfs: stale handle"));
        }
        Ok(())
    }
}

const KERNEL: &[u8] = b"MZ\x90\x00kernel image payload";
const GRUB: &[u8] = b"MZ\x90\x00grub payload with more bytes";

#[test]
fn test_container_reads_match_direct_member_reads() {
    let container = Arc::new(MemoryContainer::new(&[("kernel.efi", KERNEL), ("grubx64.efi", GRUB)], true));
    let image = ContainerEfiImage::new(container.clone(), "/var/lib/snapd/snaps/pc-kernel_1.snap", "kernel.efi");

    let mut handle = image.open().expect("Failed to open container image");
    let mut via_image = vec![0u8; 12];
    handle.read_exact_at(&mut via_image, 4).expect("Failed to read via image");

    let mut direct = container.open_member("kernel.efi").expect("Failed to open member");
    let mut via_member = vec![0u8; 12];
    assert_eq!(direct.read_at(&mut via_member, 4).expect("Failed to read member"), 12);

    assert_eq!(via_image, via_member);
    assert_eq!(handle.read_to_end().expect("Failed to read image"), KERNEL);
    handle.close().expect("Failed to close image");
}

#[test]
fn test_container_size_from_metadata() {
    let container = Arc::new(MemoryContainer::new(&[("grubx64.efi", GRUB)], true));
    let image = ContainerEfiImage::new(container, "pc.snap", "grubx64.efi");

    let size = with_handle(&image, |handle| handle.size()).expect("Failed to query size");
    assert_eq!(size, GRUB.len() as u64);
}

#[test]
fn test_container_size_without_metadata_is_unsupported() {
    let container = Arc::new(MemoryContainer::new(&[("grubx64.efi", GRUB)], false));
    let image = ContainerEfiImage::new(container, "pc.snap", "grubx64.efi");

    let handle = image.open().expect("Failed to open container image");
    let result = handle.size();

    if let Err(EfiImageError::Unsupported { image, operation, source }) = result {
        assert_eq!(image, "container:pc.snap:grubx64.efi");
        assert_eq!(operation, HandleOperation::Size);
        assert_eq!(source.kind(), io::ErrorKind::Unsupported);
        assert_eq!(source.to_string(), "sizes not recorded");
    } else {
        panic!("Expected Unsupported error, got {:?}", result);
    }
}

#[test]
fn test_read_to_end_without_metadata_reads_until_end() {
    let container = Arc::new(MemoryContainer::new(&[("grubx64.efi", GRUB)], false));
    let image = ContainerEfiImage::new(container, "pc.snap", "grubx64.efi");

    let content = with_handle(&image, |handle| handle.read_to_end()).expect("Failed to read image");
    assert_eq!(content, GRUB);
}

#[test]
fn test_close_releases_member_handle_once() {
    let container = Arc::new(MemoryContainer::new(&[("kernel.efi", KERNEL)], true));
    let closed = container.closed.clone();
    let image = ContainerEfiImage::new(container, "pc-kernel.snap", "kernel.efi");

    with_handle(&image, |handle| handle.size()).expect("Failed to query size");
    assert_eq!(closed.load(Ordering::SeqCst), 1);

    // The close still happens when the closure fails
    let result: Result<(), EfiImageError> = with_handle(&image, |handle| {
        let mut buf = vec![0u8; KERNEL.len() + 1];
        handle.read_exact_at(&mut buf, 0)
    });
    assert!(result.is_err());
    assert_eq!(closed.load(Ordering::SeqCst), 2);
}

#[test]
fn test_close_failure_surfaces_as_io_error() {
    let container = Arc::new(MemoryContainer::new(&[("kernel.efi", KERNEL)], true).failing_close());
    let image = ContainerEfiImage::new(container, "pc-kernel.snap", "kernel.efi");

    let handle = image.open().expect("Failed to open container image");
    let result = handle.close();

    match result {
        Err(EfiImageError::Io { image, operation, source }) => {
            assert_eq!(image, "container:pc-kernel.snap:kernel.efi");
            assert_eq!(operation, HandleOperation::Close);
            assert_eq!(source.to_string(), "squashfs: stale handle");
        },
        other => panic!("Expected Io error on close, got {:?}", other),
    }
}

#[test]
fn test_with_handle_returns_close_error_after_success() {
    let container = Arc::new(MemoryContainer::new(&[("kernel.efi", KERNEL)], true).failing_close());
    let closed = container.closed.clone();
    let image = ContainerEfiImage::new(container, "pc-kernel.snap", "kernel.efi");

    let result = with_handle(&image, |handle| handle.size());

    assert!(
        matches!(result, Err(EfiImageError::Io { operation: HandleOperation::Close, .. })),
        "Expected close error, got {:?}",
        result
    );
    assert_eq!(closed.load(Ordering::SeqCst), 1);
}

#[test]
fn test_with_handle_prefers_closure_error_over_close_error() {
    let container = Arc::new(MemoryContainer::new(&[("kernel.efi", KERNEL)], false).failing_close());
    let image = ContainerEfiImage::new(container, "pc-kernel.snap", "kernel.efi");

    let result = with_handle(&image, |handle| handle.size());

    assert!(
        matches!(result, Err(EfiImageError::Unsupported { operation: HandleOperation::Size, .. })),
        "Expected size error, got {:?}",
        result
    );
}

#[test]
fn test_with_handle_closes_when_closure_panics() {
    let container = Arc::new(MemoryContainer::new(&[("kernel.efi", KERNEL)], true));
    let closed = container.closed.clone();
    let image = ContainerEfiImage::new(container, "pc-kernel.snap", "kernel.efi");

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        with_handle(&image, |_handle| -> Result<(), EfiImageError> { panic!("digest stage failed") })
    }));

    assert!(outcome.is_err());
    assert_eq!(closed.load(Ordering::SeqCst), 1);
}

#[test]
fn test_open_missing_member_fails_with_not_found() {
    let mut container = MockContainer::new();
    container
        .expect_open_member()
        .with(eq("shimx64.efi"))
        .times(1)
        .returning(|_| Err(io::Error::new(io::ErrorKind::NotFound, "member not found")));
    let image = ContainerEfiImage::new(Arc::new(container), "pc.snap", "shimx64.efi");

    let result = image.open();

    match result {
        Err(EfiImageError::NotFound { image, operation, source }) => {
            assert_eq!(image, "container:pc.snap:shimx64.efi");
            assert_eq!(operation, HandleOperation::Open);
            assert_eq!(source.to_string(), "member not found");
        },
        Err(other) => panic!("Expected NotFound error, got {:?}", other),
        Ok(_) => panic!("Expected NotFound error, got a handle"),
    }
}

#[test]
fn test_open_failure_is_propagated_verbatim() {
    let mut container = MockContainer::new();
    container
        .expect_open_member()
        .returning(|_| Err(io::Error::new(io::ErrorKind::PermissionDenied, "squashfs: permission denied")));
    let image = ContainerEfiImage::new(Arc::new(container), "pc.snap", "shimx64.efi");

    match image.open() {
        Err(EfiImageError::Io { source, .. }) => {
            assert_eq!(source.kind(), io::ErrorKind::PermissionDenied);
            assert_eq!(source.to_string(), "squashfs: permission denied");
        },
        Err(other) => panic!("Expected Io error, got {:?}", other),
        Ok(_) => panic!("Expected Io error, got a handle"),
    }
}

#[test]
fn test_display_uses_container_prefix_and_is_stable() {
    let container = Arc::new(MemoryContainer::new(&[], true));
    let image = Image::from(ContainerEfiImage::new(container, "/snaps/pc_10.snap", "shimx64.efi"));

    assert_eq!(image.to_string(), "container:/snaps/pc_10.snap:shimx64.efi");
    assert_eq!(image.to_string(), image.to_string());
}

#[test]
fn test_directory_container_reads_members() {
    let dir = tempdir().expect("Failed to create temporary directory");
    fs::create_dir_all(dir.path().join("EFI/boot")).expect("Failed to create directories");
    fs::write(dir.path().join("EFI/boot/bootx64.efi"), GRUB).expect("Failed to write member");

    let container = Arc::new(DirectoryContainer::new(dir.path()));
    let image = ContainerEfiImage::new(container, dir.path().display().to_string(), "EFI/boot/bootx64.efi");

    let mut handle = image.open().expect("Failed to open member");
    assert_eq!(handle.size().expect("Failed to query size"), GRUB.len() as u64);
    assert_eq!(handle.read_to_end().expect("Failed to read member"), GRUB);
    handle.close().expect("Failed to close member");
}

#[test]
fn test_directory_container_missing_member_is_not_found() {
    let dir = tempdir().expect("Failed to create temporary directory");
    let image = ContainerEfiImage::new(Arc::new(DirectoryContainer::new(dir.path())), "unpacked", "kernel.efi");

    let result = image.open();
    assert!(matches!(result, Err(EfiImageError::NotFound { .. })));
}

#[test]
fn test_directory_container_rejects_escaping_member_names() {
    let dir = tempdir().expect("Failed to create temporary directory");
    let container = DirectoryContainer::new(dir.path().join("root"));

    for name in ["../outside.efi", "/etc/passwd", ""] {
        match container.open_member(name) {
            Err(e) => assert_eq!(e.kind(), io::ErrorKind::InvalidInput, "member {:?}", name),
            Ok(_) => panic!("Expected member {:?} to be rejected", name),
        }
    }
}
