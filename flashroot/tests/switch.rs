mod common;

use std::fs;

use common::{CountingReconciler, Event, FakeVolumes, RecordingMounts, Scratch};
use flashroot::{
    config::SwitchConfig,
    switch::SwitchOrchestrator,
    volume::FsState,
    FlashrootError,
};
use nix::mount::MsFlags;

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[test_log::test]
fn test_deadcode_copies_before_pivot_and_reconciles_once() {
    let scratch = Scratch::new();
    let layout = &scratch.layout;
    let volumes = FakeVolumes::new(&scratch.log, scratch.volume(), FsState::Deadcode);
    let mounts = RecordingMounts::booted_on_ram(&scratch.log, layout);
    let config = SwitchConfig::default();
    scratch.log.watch(scratch.copied_file());

    SwitchOrchestrator::new(&volumes, &mounts, layout, &config)
        .with_reconciler(CountingReconciler::new(&scratch.log))
        .switch_to_persistent_overlay()
        .unwrap();

    assert_eq!(
        scratch.log.events(),
        vec![
            Event::Mount {
                source: scratch.volume().get_block_path().clone(),
                target: layout.rom_overlay.clone(),
                fstype: Some("jffs2".to_string()),
            },
            Event::Remount {
                target: layout.root.clone(),
                flags: MsFlags::MS_RDONLY | MsFlags::MS_NOATIME,
            },
            Event::Pivot {
                new_root: layout.rom.clone(),
                old_root: layout.pivot_scratch.clone(),
            },
            Event::Move {
                from: layout.pivot_scratch.clone(),
                to: layout.ram_root.clone(),
            },
            Event::Fopivot {
                rw_root: layout.overlay.clone(),
                ro_root: layout.rom.clone(),
            },
            Event::Detach(layout.ram_root.clone()),
            Event::Reconcile(layout.overlay.clone()),
        ]
    );

    let recorded = scratch.log.recorded();
    assert!(!recorded[1].probe_present, "copied before remount");
    assert!(recorded[2].probe_present, "pivot before copy");
    assert_eq!(
        fs::read_to_string(scratch.copied_file()).unwrap(),
        "config system\n"
    );
    assert!(!layout.guard_file.exists());
    assert_eq!(volumes.init_calls.get(), 0);
}

#[test_log::test]
fn test_guard_file_exists_only_while_mounting_flash() {
    let scratch = Scratch::new();
    let layout = &scratch.layout;
    let volumes = FakeVolumes::new(&scratch.log, scratch.volume(), FsState::Deadcode);
    let mounts = RecordingMounts::booted_on_ram(&scratch.log, layout);
    let config = SwitchConfig::default();
    scratch.log.watch(layout.guard_file.clone());

    SwitchOrchestrator::new(&volumes, &mounts, layout, &config)
        .with_reconciler(CountingReconciler::new(&scratch.log))
        .switch_to_persistent_overlay()
        .unwrap();

    let recorded = scratch.log.recorded();
    assert!(matches!(recorded[0].event, Event::Mount { .. }));
    assert!(recorded[0].probe_present, "guard missing during mount");
    assert!(matches!(recorded[1].event, Event::Remount { .. }));
    assert!(!recorded[1].probe_present, "guard left after mount");
    assert!(recorded[1..].iter().all(|entry| !entry.probe_present));
}

#[test_log::test]
fn test_unmarked_volume_takes_the_reformat_path() {
    let scratch = Scratch::new();
    let layout = &scratch.layout;
    let volumes = FakeVolumes::new(&scratch.log, scratch.volume(), FsState::None);
    let mounts = RecordingMounts::booted_on_ram(&scratch.log, layout);
    let config = SwitchConfig::default();

    SwitchOrchestrator::new(&volumes, &mounts, layout, &config)
        .with_reconciler(CountingReconciler::new(&scratch.log))
        .switch_to_persistent_overlay()
        .unwrap();

    assert_eq!(
        scratch.log.count(|event| matches!(event, Event::Reconcile(_))),
        1
    );
    let fopivot = scratch
        .log
        .position(|event| matches!(event, Event::Fopivot { .. }))
        .unwrap();
    let reconcile = scratch
        .log
        .position(|event| matches!(event, Event::Reconcile(_)))
        .unwrap();
    assert!(fopivot < reconcile);
    assert!(scratch.copied_file().exists());
}

#[test_log::test]
fn test_persistent_volume_is_adopted_without_copy_or_reconcile() {
    let scratch = Scratch::new();
    let layout = &scratch.layout;
    let volumes = FakeVolumes::new(&scratch.log, scratch.volume(), FsState::Persistent);
    let mounts = RecordingMounts::booted_on_ram(&scratch.log, layout);
    let config = SwitchConfig::default();

    SwitchOrchestrator::new(&volumes, &mounts, layout, &config)
        .with_reconciler(CountingReconciler::new(&scratch.log))
        .switch_to_persistent_overlay()
        .unwrap();

    assert_eq!(
        scratch.log.events(),
        vec![
            Event::Mount {
                source: scratch.volume().get_block_path().clone(),
                target: layout.staging.clone(),
                fstype: Some("jffs2".to_string()),
            },
            Event::Init,
            Event::Move {
                from: layout.staging.clone(),
                to: layout.overlay.clone(),
            },
            Event::Fopivot {
                rw_root: layout.overlay.clone(),
                ro_root: layout.rom.clone(),
            },
        ]
    );
    assert!(!scratch.copied_file().exists());
    assert!(layout.staging.is_dir());
}

#[test_log::test]
fn test_active_persistent_overlay_fails_without_side_effects() {
    let scratch = Scratch::new();
    let layout = &scratch.layout;
    let volumes = FakeVolumes::new(&scratch.log, scratch.volume(), FsState::Deadcode);
    let mounts = RecordingMounts::booted_on_ram(&scratch.log, layout)
        .with_overlay(layout.persistent_overlay_tag.clone());
    let config = SwitchConfig::default();

    let err = SwitchOrchestrator::new(&volumes, &mounts, layout, &config)
        .with_reconciler(CountingReconciler::new(&scratch.log))
        .switch_to_persistent_overlay()
        .unwrap_err();

    assert!(err.is_precondition(), "{err}");
    assert!(scratch.log.events().is_empty());
    assert!(!layout.guard_file.exists());
}

#[test_log::test]
fn test_missing_ram_overlay_fails_without_side_effects() {
    let scratch = Scratch::new();
    let layout = &scratch.layout;
    let volumes = FakeVolumes::new(&scratch.log, scratch.volume(), FsState::Deadcode);
    let mounts = RecordingMounts::early_boot(&scratch.log, layout);
    let config = SwitchConfig::default();

    let err = SwitchOrchestrator::new(&volumes, &mounts, layout, &config)
        .switch_to_persistent_overlay()
        .unwrap_err();

    assert!(err.is_precondition(), "{err}");
    assert!(scratch.log.events().is_empty());
}

#[test_log::test]
fn test_missing_overlay_driver_fails_without_side_effects() {
    let scratch = Scratch::new();
    let layout = &scratch.layout;
    let volumes = FakeVolumes::new(&scratch.log, scratch.volume(), FsState::Deadcode);
    let mounts = RecordingMounts::booted_on_ram(&scratch.log, layout).without_filesystems();
    let config = SwitchConfig::default();

    let err = SwitchOrchestrator::new(&volumes, &mounts, layout, &config)
        .switch_to_persistent_overlay()
        .unwrap_err();

    assert!(err.is_precondition(), "{err}");
    assert!(scratch.log.events().is_empty());
}

#[test_log::test]
fn test_missing_volume_is_lookup_error() {
    let scratch = Scratch::new();
    let layout = &scratch.layout;
    let volumes = FakeVolumes::empty(&scratch.log);
    let mounts = RecordingMounts::booted_on_ram(&scratch.log, layout);
    let config = SwitchConfig::default();

    let err = SwitchOrchestrator::new(&volumes, &mounts, layout, &config)
        .switch_to_persistent_overlay()
        .unwrap_err();

    assert!(err.is_lookup(), "{err}");
    assert!(scratch.log.events().is_empty());
}

#[test_log::test]
fn test_mounted_volume_fails_without_side_effects() {
    let scratch = Scratch::new();
    let layout = &scratch.layout;
    let volume = scratch.volume();
    let volumes = FakeVolumes::new(&scratch.log, volume.clone(), FsState::Persistent);
    let mounts = RecordingMounts::booted_on_ram(&scratch.log, layout).with_mount_point(
        volume.get_block_path(),
        "/mnt/elsewhere",
        "jffs2",
    );
    let config = SwitchConfig::default();

    let err = SwitchOrchestrator::new(&volumes, &mounts, layout, &config)
        .switch_to_persistent_overlay()
        .unwrap_err();

    assert!(err.is_precondition(), "{err}");
    assert!(err.to_string().contains("/mnt/elsewhere"));
    assert!(scratch.log.events().is_empty());
}

#[test_log::test]
fn test_running_switch_blocks_a_second_one() {
    let scratch = Scratch::new();
    let layout = &scratch.layout;
    let volumes = FakeVolumes::new(&scratch.log, scratch.volume(), FsState::Deadcode);
    let mounts = RecordingMounts::booted_on_ram(&scratch.log, layout);
    let config = SwitchConfig::default();
    fs::write(&layout.guard_file, "held").unwrap();

    let err = SwitchOrchestrator::new(&volumes, &mounts, layout, &config)
        .switch_to_persistent_overlay()
        .unwrap_err();

    assert!(err.is_precondition(), "{err}");
    assert!(err.to_string().contains("already running"), "{err}");
    assert!(scratch.log.events().is_empty());
    assert_eq!(fs::read_to_string(&layout.guard_file).unwrap(), "held");
}

#[test_log::test]
fn test_failed_flash_mount_removes_guard_and_stops() {
    let scratch = Scratch::new();
    let layout = &scratch.layout;
    let volumes = FakeVolumes::new(&scratch.log, scratch.volume(), FsState::Deadcode);
    let mounts = RecordingMounts::booted_on_ram(&scratch.log, layout).failing("mount");
    let config = SwitchConfig::default();

    let err = SwitchOrchestrator::new(&volumes, &mounts, layout, &config)
        .with_reconciler(CountingReconciler::new(&scratch.log))
        .switch_to_persistent_overlay()
        .unwrap_err();

    assert!(matches!(err, FlashrootError::Syscall { ref op, .. } if op == "mount"));
    assert_eq!(scratch.log.events().len(), 1);
    assert!(!layout.guard_file.exists());
}

#[test_log::test]
fn test_copy_failure_is_fatal_when_strict() {
    let scratch = Scratch::new();
    let layout = &scratch.layout;
    fs::remove_dir_all(&layout.ram_root).unwrap();
    let volumes = FakeVolumes::new(&scratch.log, scratch.volume(), FsState::Deadcode);
    let mounts = RecordingMounts::booted_on_ram(&scratch.log, layout);
    let config = SwitchConfig { strict_copy: true };

    let err = SwitchOrchestrator::new(&volumes, &mounts, layout, &config)
        .with_reconciler(CountingReconciler::new(&scratch.log))
        .switch_to_persistent_overlay()
        .unwrap_err();

    assert!(matches!(err, FlashrootError::Syscall { .. }), "{err}");
    assert_eq!(
        scratch.log.count(|event| matches!(event, Event::Pivot { .. })),
        0
    );
}

#[test_log::test]
fn test_copy_failure_is_tolerated_when_not_strict() {
    let scratch = Scratch::new();
    let layout = &scratch.layout;
    fs::remove_dir_all(&layout.ram_root).unwrap();
    let volumes = FakeVolumes::new(&scratch.log, scratch.volume(), FsState::Deadcode);
    let mounts = RecordingMounts::booted_on_ram(&scratch.log, layout);
    let config = SwitchConfig { strict_copy: false };

    SwitchOrchestrator::new(&volumes, &mounts, layout, &config)
        .with_reconciler(CountingReconciler::new(&scratch.log))
        .switch_to_persistent_overlay()
        .unwrap();

    assert_eq!(
        scratch.log.count(|event| matches!(event, Event::Reconcile(_))),
        1
    );
}

#[test_log::test]
fn test_failed_detach_still_reconciles() {
    let scratch = Scratch::new();
    let layout = &scratch.layout;
    let volumes = FakeVolumes::new(&scratch.log, scratch.volume(), FsState::Deadcode);
    let mounts = RecordingMounts::booted_on_ram(&scratch.log, layout).failing("detach");
    let config = SwitchConfig::default();

    SwitchOrchestrator::new(&volumes, &mounts, layout, &config)
        .with_reconciler(CountingReconciler::new(&scratch.log))
        .switch_to_persistent_overlay()
        .unwrap();

    assert_eq!(
        scratch.log.events().last(),
        Some(&Event::Reconcile(layout.overlay.clone()))
    );
}

#[test_log::test]
fn test_failed_pivot_aborts_before_reconcile() {
    let scratch = Scratch::new();
    let layout = &scratch.layout;
    let volumes = FakeVolumes::new(&scratch.log, scratch.volume(), FsState::Deadcode);
    let mounts = RecordingMounts::booted_on_ram(&scratch.log, layout).failing("pivot");
    let config = SwitchConfig::default();

    let err = SwitchOrchestrator::new(&volumes, &mounts, layout, &config)
        .with_reconciler(CountingReconciler::new(&scratch.log))
        .switch_to_persistent_overlay()
        .unwrap_err();

    assert!(err.to_string().starts_with("pivot "), "{err}");
    assert!(matches!(
        scratch.log.events().last(),
        Some(Event::Pivot { .. })
    ));
}
