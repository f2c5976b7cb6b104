extern crate clap;
use crossbeam_channel::{bounded, Receiver}; // Inter-thread communication
use embedded_hal::digital::PinState;
use log::{error, info, warn};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

// Internal project modules
use mcpio_core::transport::I2cTransport;
use mcpio_core::{
    constants, AddressMode, Error, Expander, InterruptControl, OutputType, PinControl, PinMode,
    PollOutcome, TriggerMode,
};
use mcpio_peripherals::sim::{
    SimExpander, SimHost, SimResetLine, StdDelay, Stimulus, StimulusDriver,
};

// Host pin the simulated INTA output is wired to
const HOST_INT_PIN: u8 = 2;

type SimDriver = Expander<I2cTransport<SimExpander>, SimResetLine, SimHost>;

static CALLBACKS: AtomicU32 = AtomicU32::new(0);

fn on_interrupt(pin: u8) {
    let n = CALLBACKS.fetch_add(1, Ordering::SeqCst) + 1;
    info!("callback #{} for pin {}", n, pin);
}

/// Configures command-line interface using clap
fn get_cli_config<'a>() -> clap::ArgMatches<'a> {
    let description = "MCP23017 I/O expander driver exercised against a simulated chip";
    clap::App::new("mcpio")
        .version("0.1")
        .about(description)
        .arg(
            clap::Arg::with_name("address")
                .long("address")
                .takes_value(true)
                .default_value("0x20")
                .help("Bus address of the expander (0x20-0x27)"),
        )
        .arg(
            clap::Arg::with_name("grouped")
                .long("grouped")
                .help("Switch the chip to the grouped (BANK = 1) register layout"),
        )
        .subcommand(
            clap::SubCommand::with_name("blink")
                .about("Toggle one output pin")
                .arg(pin_arg("0"))
                .arg(
                    clap::Arg::with_name("cycles")
                        .long("cycles")
                        .takes_value(true)
                        .default_value("10"),
                )
                .arg(
                    clap::Arg::with_name("period")
                        .long("period")
                        .takes_value(true)
                        .default_value("250")
                        .help("Half period in milliseconds"),
                ),
        )
        .subcommand(
            clap::SubCommand::with_name("watch")
                .about("Bind an interrupt trigger and serve simulated button presses")
                .arg(pin_arg("5"))
                .arg(
                    clap::Arg::with_name("mode")
                        .long("mode")
                        .takes_value(true)
                        .possible_values(&["change", "rising", "falling", "low", "high"])
                        .default_value("falling"),
                )
                .arg(
                    clap::Arg::with_name("events")
                        .long("events")
                        .takes_value(true)
                        .default_value("5"),
                ),
        )
        .subcommand(
            clap::SubCommand::with_name("dump").about("Print the register mirror after start-up"),
        )
        .get_matches()
}

fn pin_arg<'a, 'b>(default: &'a str) -> clap::Arg<'a, 'b> {
    clap::Arg::with_name("pin")
        .long("pin")
        .takes_value(true)
        .default_value(default)
        .help("Expander pin, 0-15 (GPA0-GPB7)")
}

fn parse_number(value: Option<&str>) -> Option<u32> {
    let value = value?;
    match value.strip_prefix("0x") {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => value.parse().ok(),
    }
}

fn parse_mode(value: Option<&str>) -> TriggerMode {
    match value {
        Some("change") => TriggerMode::Change,
        Some("rising") => TriggerMode::Rising,
        Some("low") => TriggerMode::Low,
        Some("high") => TriggerMode::High,
        _ => TriggerMode::Falling,
    }
}

/// Builds a simulated chip and a driver bound to it
fn open(address: u8, grouped: bool) -> Result<(SimDriver, SimExpander), Error> {
    let chip = SimExpander::new(address);
    let host = SimHost::new();
    chip.wire(Some(HOST_INT_PIN), None, host.clone());

    let mut expander = Expander::new(chip.clone(), SimResetLine::new(chip.clone()), address, host)?;
    expander.begin(&mut StdDelay)?;
    if grouped {
        expander.set_address_mode(AddressMode::Grouped)?;
    }
    info!(
        "expander at 0x{:02x}, slot {}, {:?} layout",
        address,
        expander.identity().slot,
        expander.address_mode()
    );
    Ok((expander, chip))
}

fn blink(
    expander: &mut SimDriver,
    chip: &SimExpander,
    pin: u8,
    cycles: u32,
    period: Duration,
    signal_receiver: &Receiver<()>,
) -> Result<(), Error> {
    expander.set_pin_direction(pin, PinMode::Output)?;
    expander.digital_write(pin, PinState::Low)?;
    for cycle in 0..cycles * 2 {
        if !signal_receiver.is_empty() {
            break;
        }
        expander.toggle_pin(pin)?;
        info!("cycle {}: pin {} is {}", cycle / 2, pin, chip.level(pin) as u8);
        std::thread::sleep(period);
    }
    Ok(())
}

fn watch(
    expander: &mut SimDriver,
    chip: &SimExpander,
    pin: u8,
    mode: TriggerMode,
    events: u32,
    signal_receiver: &Receiver<()>,
) -> Result<(), Error> {
    expander.set_pin_direction(pin, PinMode::InputPullUp)?;
    expander.configure_output(Some(HOST_INT_PIN), None, OutputType::ActiveLow, false)?;
    expander.bind_trigger(pin, on_interrupt, mode)?;
    info!("pin {} bound as {:?}", pin, expander.read_trigger(pin)?);

    // Simulated button: active-low presses with a pause in between
    let driver = StimulusDriver::spawn(chip.clone());
    for _ in 0..events {
        let press = Stimulus::Pulse {
            pin,
            level: false,
            hold: Duration::from_millis(40),
        };
        if driver.send(press).is_err() || driver.send(Stimulus::Wait(Duration::from_millis(160))).is_err() {
            warn!("stimulus thread gone");
            break;
        }
    }

    let mut served = 0;
    while served < events {
        if !signal_receiver.is_empty() {
            break;
        }
        match expander.poll_pending_interrupt() {
            Ok(PollOutcome::Served(report)) => {
                served += 1;
                info!(
                    "served pin {} (captured {}) with {} call(s)",
                    report.pin, report.captured as u8, report.invocations
                );
            }
            Ok(_) => {}
            Err(Error::UndeterminedPin) => warn!("interrupt with no flagged pin"),
            Err(e) => return Err(e),
        }
        std::thread::sleep(Duration::from_millis(1));
    }

    let applied = driver.finish();
    info!(
        "{} stimulus events, {} passes, {} callbacks",
        applied,
        served,
        CALLBACKS.load(Ordering::SeqCst)
    );
    expander.unbind_trigger(pin)
}

/// Main entry point for the expander demo
fn main() {
    env_logger::init();

    // Set up Ctrl-C handler with channel communication
    let (signal_sender, signal_receiver) = bounded(1);
    let handler_result = ctrlc::set_handler(move || {
        if signal_sender.is_full() {
            std::process::exit(-1); // Emergency exit if channel blocked
        }
        let _send_result = signal_sender.send(()); // Send shutdown signal
    });

    if let Err(e) = handler_result {
        error!("Signal handler failed: {:?}", e);
        return;
    }

    // Parse command-line arguments
    let cli_matches = get_cli_config();

    let address = match parse_number(cli_matches.value_of("address")) {
        Some(a) if a <= u8::MAX as u32 => a as u8,
        _ => {
            error!("Invalid address, expected e.g. 0x{:02x}", constants::DEFAULT_ADDRESS);
            return;
        }
    };

    let (mut expander, chip) = match open(address, cli_matches.is_present("grouped")) {
        Ok(x) => x,
        Err(e) => {
            error!("Expander start-up failed: {}", e);
            return;
        }
    };

    let result = match cli_matches.subcommand() {
        ("blink", Some(args)) => {
            let pin = parse_number(args.value_of("pin")).unwrap_or(u32::MAX) as u8;
            let cycles = parse_number(args.value_of("cycles")).unwrap_or(10);
            let period = parse_number(args.value_of("period")).unwrap_or(250);
            blink(
                &mut expander,
                &chip,
                pin,
                cycles,
                Duration::from_millis(period as u64),
                &signal_receiver,
            )
        }
        ("watch", Some(args)) => {
            let pin = parse_number(args.value_of("pin")).unwrap_or(u32::MAX) as u8;
            let events = parse_number(args.value_of("events")).unwrap_or(5);
            let mode = parse_mode(args.value_of("mode"));
            watch(&mut expander, &chip, pin, mode, events, &signal_receiver)
        }
        ("dump", _) => {
            print!("{}", expander.registers());
            Ok(())
        }
        _ => {
            error!("No command given, try --help");
            return;
        }
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
    }
    if expander.take_read_error() || expander.take_write_error() {
        warn!("bus errors were recorded during the run");
    }
}
