use anyhow::{Context, Result};
use cpal::Device;
use cpal::traits::{DeviceTrait, HostTrait};

fn get_host() -> cpal::Host {
    cpal::default_host()
}

/// Finds the named input device, or the host default when no name is given.
pub fn get_or_default_input(device_name: Option<&str>) -> Result<Device> {
    let host = get_host();
    tracing::debug!("Host: {:?}", host.id());
    match device_name {
        None => host.default_input_device().context("no default input device"),
        Some(name) => find_by_name(host.input_devices()?, name)
            .with_context(|| format!("input device '{}' not found", name)),
    }
}

/// Finds the named output device, or the host default when no name is given.
pub fn get_or_default_output(device_name: Option<&str>) -> Result<Device> {
    let host = get_host();
    match device_name {
        None => host.default_output_device().context("no default output device"),
        Some(name) => find_by_name(host.output_devices()?, name)
            .with_context(|| format!("output device '{}' not found", name)),
    }
}

fn find_by_name(mut devices: impl Iterator<Item = Device>, target: &str) -> Option<Device> {
    devices.find(|device| device.name().is_ok_and(|name| name == target))
}

/// One line per input device: name, channels, rate, default marker.
pub fn get_available_inputs() -> Result<String> {
    let host = get_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());
    let mut lines = Vec::new();
    for device in host.input_devices()? {
        let name = device.name().unwrap_or_else(|_| "<unnamed>".to_string());
        let Ok(cfg) = device.default_input_config() else {
            continue;
        };
        lines.push(describe(&name, cfg.channels(), cfg.sample_rate().0, default_name.as_deref()));
    }
    Ok(lines.join("\n"))
}

pub fn get_available_outputs() -> Result<String> {
    let host = get_host();
    let default_name = host.default_output_device().and_then(|d| d.name().ok());
    let mut lines = Vec::new();
    for device in host.output_devices()? {
        let name = device.name().unwrap_or_else(|_| "<unnamed>".to_string());
        let Ok(cfg) = device.default_output_config() else {
            continue;
        };
        lines.push(describe(&name, cfg.channels(), cfg.sample_rate().0, default_name.as_deref()));
    }
    Ok(lines.join("\n"))
}

fn describe(name: &str, channels: u16, rate: u32, default_name: Option<&str>) -> String {
    let mut line = format!(" * {}({}ch, {}hz)", name, channels, rate);
    if default_name == Some(name) {
        line.push_str(" [default]");
    }
    line
}
