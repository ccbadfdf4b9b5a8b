//! `flashroot` moves an embedded Linux device's writable root overlay from RAM to flash.
//!
//! # Overview
//!
//! On a typical OpenWrt-style image the root filesystem is a read-only squashfs with a writable
//! overlay on top. Early in boot that overlay lives in a tmpfs; once the persistent `rootfs_data`
//! flash partition is usable the overlay is switched onto it without a reboot. This crate
//! implements that switch and the administrative operations around it:
//!
//! - [`switch`] classifies the flash volume and installs it as the live overlay, copying the
//!   RAM overlay across when the volume has to be (re)formatted
//! - [`whiteout`] applies the deferred deletions left behind by the old overlay
//! - [`reset`] performs a factory reset of the persistent overlay
//! - [`mark`] schedules a reformat by writing the `0xDEADC0DE` sentinel
//! - [`boot`] is the boot-time entry point with its extroot and RAM fallbacks
//!
//! # Architecture
//!
//! The kernel-facing pieces sit behind two traits so the orchestration can be exercised without
//! root privileges:
//!
//! - [`volume::VolumeManager`] finds, identifies, unlocks and erases flash volumes
//!   ([`volume::MtdVolumes`] implements it over `/proc/mtd`)
//! - [`mounts::MountOps`] inspects the mount table and performs mount, pivot and move operations
//!   ([`mounts::SystemMounts`] implements it over procfs and `nix`)
//!
//! Every operation is synchronous. Nothing is rolled back on failure: once the live root has
//! been touched the safest recovery is a reboot.

#![warn(missing_docs)]

mod error;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub mod boot;
pub mod cli;
pub mod config;
pub mod mark;
pub mod mounts;
pub mod registry;
pub mod reset;
pub mod rootfs;
pub mod switch;
pub mod volume;
pub mod whiteout;

pub use error::*;
