// Default bus address with A2..A0 strapped low
pub const DEFAULT_ADDRESS: u8 = 0x20;

// Register file geometry
pub const REGISTER_COUNT: usize = 22;
pub const REGISTER_MAX: u8 = 0x15;
pub const PIN_COUNT: u8 = 16;
pub const PORT_COUNT: u8 = 2;
pub const PINS_PER_PORT: u8 = 8;

// Number of expander instances that can own a host trampoline
pub const MAX_INSTANCES: usize = 6;

// Reset line low time
pub const RESET_PULSE_MS: u32 = 10;

pub mod registers {
    // Canonical offsets (IOCON.BANK = 0 layout); port A even, port B odd
    pub const IODIRA: u8 = 0x00; // I/O direction, 1 = input
    pub const IODIRB: u8 = 0x01;
    pub const IPOLA: u8 = 0x02; // Input polarity
    pub const IPOLB: u8 = 0x03;
    pub const GPINTENA: u8 = 0x04; // Interrupt-on-change enable
    pub const GPINTENB: u8 = 0x05;
    pub const DEFVALA: u8 = 0x06; // Default compare value
    pub const DEFVALB: u8 = 0x07;
    pub const INTCONA: u8 = 0x08; // Interrupt control, 1 = compare against DEFVAL
    pub const INTCONB: u8 = 0x09;
    pub const IOCON: u8 = 0x0A; // Configuration, shared by both ports
    pub const IOCON_ALIAS: u8 = 0x0B;
    pub const GPPUA: u8 = 0x0C; // Pull-up enable
    pub const GPPUB: u8 = 0x0D;
    pub const INTFA: u8 = 0x0E; // Interrupt flag (read-only)
    pub const INTFB: u8 = 0x0F;
    pub const INTCAPA: u8 = 0x10; // Interrupt capture (read-only)
    pub const INTCAPB: u8 = 0x11;
    pub const GPIOA: u8 = 0x12; // Port levels
    pub const GPIOB: u8 = 0x13;
    pub const OLATA: u8 = 0x14; // Output latch
    pub const OLATB: u8 = 0x15;

    /// Register names indexed by canonical offset
    pub const NAMES: [&str; super::REGISTER_COUNT] = [
        "IODIRA", "IODIRB", "IPOLA", "IPOLB", "GPINTENA", "GPINTENB", "DEFVALA", "DEFVALB",
        "INTCONA", "INTCONB", "IOCON", "IOCON", "GPPUA", "GPPUB", "INTFA", "INTFB", "INTCAPA",
        "INTCAPB", "GPIOA", "GPIOB", "OLATA", "OLATB",
    ];

    // Grouped (IOCON.BANK = 1) layout bases
    pub const GROUPED_PORT_A_BASE: u8 = 0x00;
    pub const GROUPED_PORT_B_BASE: u8 = 0x10;
    pub const GROUPED_BLOCK_LEN: usize = 11;
}

pub mod iocon {
    // IOCON bit positions
    pub const BIT_BANK: u8 = 7;
    pub const BIT_MIRROR: u8 = 6;
    pub const BIT_SEQOP: u8 = 5;
    pub const BIT_DISSLW: u8 = 4;
    pub const BIT_HAEN: u8 = 3;
    pub const BIT_ODR: u8 = 2;
    pub const BIT_INTPOL: u8 = 1;
}

pub mod pins {
    pub const GPA0: u8 = 0;
    pub const GPA1: u8 = 1;
    pub const GPA2: u8 = 2;
    pub const GPA3: u8 = 3;
    pub const GPA4: u8 = 4;
    pub const GPA5: u8 = 5;
    pub const GPA6: u8 = 6;
    pub const GPA7: u8 = 7;
    pub const GPB0: u8 = 8;
    pub const GPB1: u8 = 9;
    pub const GPB2: u8 = 10;
    pub const GPB3: u8 = 11;
    pub const GPB4: u8 = 12;
    pub const GPB5: u8 = 13;
    pub const GPB6: u8 = 14;
    pub const GPB7: u8 = 15;

    pub const PORT_A: u8 = 0;
    pub const PORT_B: u8 = 1;
}

pub mod status {
    // Numeric status codes reported by `Error::code`
    pub const OK: u8 = 0x00;
    pub const OUT_OF_RANGE: u8 = 0x64;
    pub const WRITE_FAILURE: u8 = 0x65;
    pub const PIN_ASSIGNMENT: u8 = 0x66;
    pub const UNDETERMINED_PIN: u8 = 0x67;
    pub const OPERATION_FAILED: u8 = 0x68;
    pub const READ_FAILURE: u8 = 0x69;
    pub const NOT_CONFIGURED: u8 = 0x6A;
    pub const REGISTRY_FULL: u8 = 0x6B;
}
