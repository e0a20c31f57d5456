#[macro_use]
extern crate log;

extern crate structopt;
use structopt::StructOpt;

extern crate simplelog;
use simplelog::{Config, LevelFilter, SimpleLogger};

use std::fs;
use std::num::ParseIntError;
use std::path::PathBuf;

use anyhow::Context;
use indicatif::{ProgressBar, ProgressStyle};

use rom_uart_loader::linux::{LinuxError, LinuxProgrammer};
use rom_uart_loader::{Options, PinTest, Session};

#[derive(Clone, Debug, StructOpt)]
pub struct Args {
    #[structopt(subcommand)]
    operation: Operation,

    /// Log level for console output
    #[structopt(long, default_value = "info")]
    log_level: LevelFilter,
}

#[derive(Clone, Debug, StructOpt)]
pub struct Connect {
    /// Serial port to connect to
    #[structopt(long)]
    port: String,

    /// Serial port baud rate
    #[structopt(long)]
    baud: usize,

    #[structopt(flatten)]
    options: Options,
}

#[derive(Clone, Debug, StructOpt)]
pub enum Operation {
    /// Write a ROM image to the device
    Write {
        #[structopt(flatten)]
        connect: Connect,

        /// ROM image file
        #[structopt(long)]
        rom: PathBuf,

        /// Base address (decimal or 0x prefixed hex)
        #[structopt(long, default_value = "0", parse(try_from_str = parse_u16))]
        address: u16,

        /// Read the image back after writing
        #[structopt(long)]
        verify: bool,
    },

    /// Read device memory into a file
    Read {
        #[structopt(flatten)]
        connect: Connect,

        /// Output file name
        #[structopt(long)]
        output: PathBuf,

        /// Base address (decimal or 0x prefixed hex)
        #[structopt(long, default_value = "0", parse(try_from_str = parse_u16))]
        address: u16,

        /// Number of bytes to read
        #[structopt(long, default_value = "16384", parse(try_from_str = parse_u16))]
        length: u16,
    },

    /// Read single bytes at the device counter
    #[structopt(name = "readbyte")]
    ReadByte {
        #[structopt(flatten)]
        connect: Connect,

        /// Number of successive bytes to read
        #[structopt(long, default_value = "1")]
        count: usize,
    },

    /// Reset the device address and counter
    Reset {
        #[structopt(flatten)]
        connect: Connect,
    },

    /// Hold the device bus in a fixed posture for probing (read or write)
    PinTest {
        #[structopt(flatten)]
        connect: Connect,

        #[structopt(possible_values = &["read", "write"])]
        mode: PinTest,
    },
}

fn parse_u16(s: &str) -> Result<u16, ParseIntError> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(h) => u16::from_str_radix(h, 16),
        None => s.parse(),
    }
}

fn main() {
    // Parse out arguments
    let o = Args::from_args();

    // Configure logger
    let _ = SimpleLogger::init(o.log_level, Config::default());

    if let Err(e) = run(o.operation) {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn run(operation: Operation) -> anyhow::Result<()> {
    match operation {
        Operation::Write { connect, rom, address, verify } => {
            let data = fs::read(&rom)
                .with_context(|| format!("Unable to open file: {}", rom.display()))?;

            info!("ROM size: {}", bytefmt::format(data.len() as u64));

            with_programmer(&connect, |p| {
                let bar = progress_bar(data.len(), "write");
                track(&bar, p.write_image(address, &data, |s| update(&bar, s)))?;

                if verify {
                    let bar = progress_bar(data.len(), "verify");
                    track(&bar, p.verify_image(address, &data, |s| update(&bar, s)))?;
                }

                Ok(())
            })
        }
        Operation::Read { connect, output, address, length } => {
            let data = with_programmer(&connect, |p| {
                let bar = progress_bar(length as usize, "read");
                track(&bar, p.read_image(address, length, |s| update(&bar, s)))
            })?;

            fs::write(&output, &data)
                .with_context(|| format!("Unable to write file: {}", output.display()))?;

            info!("Wrote {} to {}", bytefmt::format(data.len() as u64), output.display());

            Ok(())
        }
        Operation::ReadByte { connect, count } => {
            let data = with_programmer(&connect, |p| p.read_bytes(count))?;

            println!("Result: {}", hex::encode(&data));

            Ok(())
        }
        Operation::Reset { connect } => with_programmer(&connect, |p| p.reset()),
        Operation::PinTest { connect, mode } => {
            with_programmer(&connect, |p| p.pin_test(mode))?;

            info!("Device holding {:?} posture, send reset to release", mode);

            Ok(())
        }
    }
}

/// Open the port, run one operation and close the port on every path
fn with_programmer<T, F>(connect: &Connect, f: F) -> anyhow::Result<T>
where
    F: FnOnce(&mut LinuxProgrammer) -> Result<T, LinuxError>,
{
    info!("Connecting to {}", connect.port);

    let p = LinuxProgrammer::linux(&connect.port, connect.baud, connect.options.clone())
        .with_context(|| format!("Unable to open serial port: {}", connect.port))?;

    Ok(p.scoped(f)?)
}

fn progress_bar(len: usize, msg: &str) -> ProgressBar {
    let bar = ProgressBar::new(len as u64);

    bar.set_style(
        ProgressStyle::default_bar()
            .template("{msg:>8} [{bar:40}] {bytes}/{total_bytes} ({eta})")
            .progress_chars("=> "),
    );
    bar.set_message(msg);

    bar
}

fn update(bar: &ProgressBar, s: &Session) {
    bar.set_position(s.transferred as u64);
}

fn track<T>(bar: &ProgressBar, res: Result<T, LinuxError>) -> Result<T, LinuxError> {
    match &res {
        Ok(_) => bar.finish(),
        Err(_) => bar.abandon(),
    }
    res
}
