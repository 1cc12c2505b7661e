use recdfu::{AppleDevice, DeviceMode, DeviceTable, find_apple_devices};

use crate::CliError;

pub(crate) fn list_devices(mode: Option<DeviceMode>) -> Result<(), CliError> {
    let devices = find_apple_devices(mode)?;
    if devices.is_empty() {
        println!("No device in Recovery or DFU mode found");
    } else {
        print_devices(&devices);
    }
    Ok(())
}

fn print_devices(devices: &[AppleDevice]) {
    for device in devices {
        println!(
            "Bus {} Device {:03}: ID 05ac:{:04x} ({} mode)",
            device.bus_id(),
            device.device_address(),
            device.product_id(),
            device.mode(),
        );
        match device.identity() {
            Some(identity) => println!("  {identity}"),
            None => println!("  serial number not available"),
        }
    }
}

pub(crate) fn print_table(table: &DeviceTable) {
    if table.is_empty() {
        println!("Device table is empty");
        return;
    }
    for group in table.groups() {
        println!(
            "CPID 0x{:04x}{}:",
            group.cpid(),
            if group.is_mixed() { " (mixed)" } else { "" }
        );
        for entry in group.entries().iter() {
            println!("  BDID 0x{:02x}: {:?}", entry.bdid, entry.entry_type);
        }
    }
}
