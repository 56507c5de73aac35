use uuid::Uuid;

/**
 * How long (milliseconds) to listen for advertisements before giving up on finding a shade.
 */
pub const SCAN_DURATION: u64 = 5000;

/**
 * How often (milliseconds) to look at the discovered peripherals while scanning.
 */
pub const SCAN_POLL_DELAY: u64 = 250;

/**
 * How long (milliseconds) a write to a characteristic may take.
 */
pub const WRITE_DEADLINE: u64 = 2000;

/**
 * How long (milliseconds) checking if the peripheral is still connected may take
 */
pub const IS_CONNECTED_DEADLINE: u64 = 2000;

/**
 * How long (milliseconds) establishing the link to a peripheral may take.
 */
pub const CONNECT_DEADLINE: u64 = 10000;

/**
 * The UUID of the Bluetooth BLE service exposed by PowerView shades
 */
pub const POWERVIEW_SERVICE: &str = "0000fdc1-0000-1000-8000-00805f9b34fb";

/**
 * The UUID of the characteristic that accepts commands and emits status notifications.
 */
pub const POWERVIEW_COMMAND_CHARACTERISTIC: &str = "cafe1001-c0ff-ee01-8000-a110ca7ab1e0";

// Extra services requested while scanning, useful when dumping a shade's layout
pub const DEVICE_INFORMATION_SERVICE: &str = "0000180a-0000-1000-8000-00805f9b34fb";
pub const BATTERY_SERVICE: &str = "0000180f-0000-1000-8000-00805f9b34fb";

pub const COMMAND_SET_POSITION: u16 = 0x01F7;
pub const COMMAND_IDENTIFY: u16 = 0x11F7;
pub const COMMAND_STOP: u16 = 0xB8F7;

/**
 * Placeholder for the secondary position, tertiary position and tilt fields of a set position
 * command, telling the shade to leave them alone.
 */
pub const POSITION_UNUSED: u16 = 0x8000;

pub const DEFAULT_BEEP_COUNT: u8 = 3;

pub const DEFAULT_SHADE_PREFIX: &str = "DUE";

/**
 * Scale between the 16-bit position reported by a shade and a percentage.
 * 65535 / 655.35 == 100
 */
pub const POSITION_SCALE: f32 = 655.35;

pub fn make_powerview_service_uuid() -> Uuid {
    Uuid::from_u128(0x0000fdc1_0000_1000_8000_00805f9b34fb)
}

pub fn make_powerview_command_uuid() -> Uuid {
    Uuid::from_u128(0xcafe1001_c0ff_ee01_8000_a110ca7ab1e0)
}

pub fn make_service_hints() -> Vec<Uuid> {
    vec![
        make_powerview_service_uuid(),
        Uuid::from_u128(0x0000180a_0000_1000_8000_00805f9b34fb),
        Uuid::from_u128(0x0000180f_0000_1000_8000_00805f9b34fb),
    ]
}
