// SPDX-License-Identifier: MIT

//! Minimal INI reading and the unit-configuration section layout

use serde_json::Value;

use crate::flow::types::UnitConfig;

const DEFAULT_DUT_TYPE: &str = "Unknown";

/// One `[section]` with its key/value pairs in file order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct IniSection {
    pub name: String,
    pub entries: Vec<(String, String)>,
}

impl IniSection {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }
}

/// Parsed INI text
#[derive(Debug, Clone, PartialEq, Default)]
pub struct IniDocument {
    pub sections: Vec<IniSection>,
}

impl IniDocument {
    /// Parse `key = value` / `key: value` lines grouped by `[section]` headers.
    /// Comments start with `;` or `#`; keys before the first header are dropped.
    pub fn parse(text: &str) -> Self {
        let mut sections: Vec<IniSection> = Vec::new();

        for raw in text.lines() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }

            if let Some(header) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                sections.push(IniSection {
                    name: header.trim().to_string(),
                    entries: Vec::new(),
                });
                continue;
            }

            let Some(split) = line.find(['=', ':']) else {
                log::debug!("Skipping malformed INI line: {}", line);
                continue;
            };
            let key = line[..split].trim().to_string();
            let value = line[split + 1..].trim().to_string();

            match sections.last_mut() {
                Some(section) => section.entries.push((key, value)),
                None => log::debug!("Skipping INI key '{}' outside any section", key),
            }
        }

        Self { sections }
    }

    pub fn section(&self, name: &str) -> Option<&IniSection> {
        self.sections
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name))
    }

    /// First value for `key` in any of the named sections
    fn lookup(&self, sections: &[&str], key: &str) -> Option<String> {
        sections
            .iter()
            .filter_map(|name| self.section(name))
            .find_map(|s| s.get(key))
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }
}

/// Type an INI value the way experiment payloads expect it
///
/// Booleans come from their word forms only; `1` and `0` stay integers.
pub fn typed_value(raw: &str) -> Value {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" => return Value::Bool(true),
        "false" | "no" | "off" => return Value::Bool(false),
        _ => {}
    }
    if let Ok(i) = raw.parse::<i64>() {
        return Value::from(i);
    }
    if let Some(hex) = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        if let Ok(i) = i64::from_str_radix(hex, 16) {
            return Value::from(i);
        }
    }
    if let Ok(f) = raw.parse::<f64>() {
        return Value::from(f);
    }
    Value::String(raw.to_string())
}

/// Override keys are written with underscores for the spaces in payload keys
pub fn payload_key(ini_key: &str) -> String {
    ini_key.replace('_', " ")
}

/// Render `unit_config.ini`. Keys without a value are omitted.
pub fn render_unit_config(config: &UnitConfig) -> String {
    let dut_type = config
        .dut_type
        .clone()
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_DUT_TYPE.to_string());

    let sections = [
        (
            "Connection",
            vec![
                ("COMPort", config.com_port.clone()),
                ("IPAddress", config.ip_address.clone()),
                ("SocketType", config.socket_type.clone()),
            ],
        ),
        (
            "DUT",
            vec![
                ("Product", config.product.clone()),
                ("Lot", config.lot.clone()),
                ("Wafer", config.wafer.clone()),
                ("XY", config.xy.clone()),
                ("DUTType", Some(dut_type)),
            ],
        ),
        (
            "Setup",
            vec![
                ("SetupName", config.setup_name.clone()),
                ("Operator", config.operator.clone()),
            ],
        ),
    ];

    let rendered: Vec<String> = sections
        .iter()
        .map(|(header, pairs)| {
            let mut lines = vec![format!("[{}]", header)];
            for (key, value) in pairs {
                match value.as_deref().map(str::trim) {
                    Some(value) if !value.is_empty() => {
                        lines.push(format!("{} = {}", key, value))
                    }
                    _ => {}
                }
            }
            lines.join("\n")
        })
        .collect();

    rendered.join("\n\n") + "\n"
}

/// Parse `unit_config.ini`, also accepting the `[UnitConfig]` layout of
/// `FrameworkAutomationInit.ini`
pub fn parse_unit_config(text: &str) -> UnitConfig {
    let doc = IniDocument::parse(text);
    let connection = ["Connection", "UnitConfig"];

    UnitConfig {
        com_port: doc.lookup(&connection, "COMPort"),
        ip_address: doc.lookup(&connection, "IPAddress"),
        socket_type: doc.lookup(&connection, "SocketType"),
        product: doc.lookup(&["DUT"], "Product"),
        lot: doc.lookup(&["DUT"], "Lot"),
        wafer: doc.lookup(&["DUT"], "Wafer"),
        xy: doc.lookup(&["DUT"], "XY"),
        dut_type: doc.lookup(&["DUT"], "DUTType"),
        setup_name: doc.lookup(&["Setup"], "SetupName"),
        operator: doc.lookup(&["Setup"], "Operator"),
    }
}
