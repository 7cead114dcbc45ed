//! Audio device listing.

use cpal::traits::{DeviceTrait, HostTrait};

use crate::error::CliResult;

pub fn run() -> CliResult<()> {
    let host = cpal::default_host();

    println!("Available Audio Devices");
    println!("========================\n");

    let inputs: Vec<String> = host
        .input_devices()
        .map_err(|e| crate::error::CliError::Cpal(e.to_string()))?
        .filter_map(|d| d.name().ok())
        .collect();

    if inputs.is_empty() {
        println!("No input devices found.");
    } else {
        println!("Input Devices:");
        for (idx, name) in inputs.iter().enumerate() {
            println!("  [{idx}] {name}");
        }
    }
    println!();

    let outputs: Vec<String> = host
        .output_devices()
        .map_err(|e| crate::error::CliError::Cpal(e.to_string()))?
        .filter_map(|d| d.name().ok())
        .collect();

    if outputs.is_empty() {
        println!("No output devices found.");
    } else {
        println!("Output Devices:");
        for (idx, name) in outputs.iter().enumerate() {
            println!("  [{idx}] {name}");
        }
    }

    println!();
    println!("Total: {} input(s), {} output(s)", inputs.len(), outputs.len());
    Ok(())
}
