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

/// PCR extended with "Boot Manager Code and Boot Attempts" measurements
pub const BOOT_MANAGER_CODE_PCR: u32 = 4;

/// Index of the Certificate Table entry in the Data Directory of a PE image optional header
pub const CERT_TABLE_INDEX: usize = 4;

/// Path of the TCG event log for the default TPM, in binary form
pub const DEFAULT_EVENT_LOG_PATH: &str = "/sys/kernel/security/tpm0/binary_bios_measurements";

/// Upper bound on the chain depth of a boot chain description resolved by the builder
pub const MAX_LOAD_CHAIN_DEPTH: usize = 64;

/// Display prefix of images that live inside a container
pub const CONTAINER_IMAGE_PREFIX: &str = "container";
