//! Hardware-dependent tests that require real input devices
//!
//! These tests are ignored by default and can be run with:
//! `cargo test -- --ignored`
//!
//! They require:
//! - Read access to /dev/input/event* (root or the 'input' group)
//! - The uinput module loaded and /dev/uinput writable

use remapd::device;

/// Test evdev device enumeration
#[test]
#[ignore]
fn test_real_input_devices_listed() {
    let devices = device::list_input_devices();
    println!("Found {} input event devices", devices.len());
    for dev in &devices {
        println!("  {:?}: '{}' [{}]", dev.path, dev.name, dev.phys);
    }
    assert!(!devices.is_empty(), "No readable input event devices found");
}

/// Test lookup of the first listed device by name
#[test]
#[ignore]
fn test_real_find_by_name() {
    let devices = device::list_input_devices();
    let first = devices.first().expect("No input devices");
    let selector = device::InputSelector {
        name: Some(first.name.clone()),
        ..Default::default()
    };
    let (path, dev) = device::find_input(&selector).expect("Device should be found by name");
    println!("Found {:?}", path);
    assert_eq!(dev.name().unwrap_or_default(), first.name);
}

/// Test uinput availability
#[test]
#[ignore]
fn test_real_uinput_available() {
    use std::path::Path;

    let uinput_path = Path::new("/dev/uinput");
    assert!(uinput_path.exists(), "/dev/uinput not found. Load the uinput module with: sudo modprobe uinput");
}

/// Test virtual device creation
#[test]
#[ignore]
fn test_real_virtual_device() {
    use evdev::uinput::VirtualDeviceBuilder;
    use evdev::{AttributeSet, Key};

    let mut keys = AttributeSet::<Key>::new();
    keys.insert(Key::KEY_A);
    let device = VirtualDeviceBuilder::new()
        .expect("Failed to open /dev/uinput")
        .name("remapd hardware test")
        .with_keys(&keys)
        .unwrap()
        .build();
    assert!(device.is_ok(), "Failed to create virtual device");
}
