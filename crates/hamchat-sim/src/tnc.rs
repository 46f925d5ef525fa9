//! Virtual TNC model
//!
//! Pure state machine: feed it command lines and data frames, collect the
//! status lines it would send back.

use std::collections::VecDeque;

use hamchat_protocol::{DataFrame, FecMode, ProtocolMode};
use tracing::debug;

/// Simulated ARDOP TNC
#[derive(Debug, Clone)]
pub struct VirtualTnc {
    callsign: String,
    gridsquare: String,
    protocol_mode: ProtocolMode,
    fec_mode: FecMode,
    repeats: u8,
    state: String,
    keyed: bool,
    buffer: Vec<u8>,
    transmitted: Vec<Vec<u8>>,
    commands: Vec<String>,
    output: VecDeque<String>,
    report_buffer: bool,
}

impl Default for VirtualTnc {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualTnc {
    /// A disconnected TNC with an empty buffer
    pub fn new() -> Self {
        Self {
            callsign: String::new(),
            gridsquare: String::new(),
            protocol_mode: ProtocolMode::Fec,
            fec_mode: FecMode::default(),
            repeats: 0,
            state: "DISC".to_string(),
            keyed: false,
            buffer: Vec::new(),
            transmitted: Vec::new(),
            commands: Vec::new(),
            output: VecDeque::new(),
            report_buffer: true,
        }
    }

    /// When disabled, BUFFER always reports 0 (confirmation never arrives)
    pub fn set_buffer_reporting(&mut self, enabled: bool) {
        self.report_buffer = enabled;
    }

    pub fn callsign(&self) -> &str {
        &self.callsign
    }

    pub fn gridsquare(&self) -> &str {
        &self.gridsquare
    }

    pub fn fec_mode(&self) -> FecMode {
        self.fec_mode
    }

    pub fn repeats(&self) -> u8 {
        self.repeats
    }

    pub fn protocol_mode(&self) -> ProtocolMode {
        self.protocol_mode
    }

    pub fn is_keyed(&self) -> bool {
        self.keyed
    }

    /// Every command line received, in order
    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    /// Bytes loaded but not yet transmitted
    pub fn buffered(&self) -> &[u8] {
        &self.buffer
    }

    /// Buffer contents at each FECSEND
    pub fn transmitted(&self) -> &[Vec<u8>] {
        &self.transmitted
    }

    /// Next status line to send
    pub fn take_output(&mut self) -> Option<String> {
        self.output.pop_front()
    }

    fn emit(&mut self, line: impl Into<String>) {
        self.output.push_back(line.into());
    }

    fn echo(&mut self, keyword: &str, value: &str) {
        self.emit(format!("{} now {}", keyword, value));
    }

    fn report_buffer(&mut self) {
        let n = if self.report_buffer { self.buffer.len() } else { 0 };
        self.emit(format!("BUFFER {}", n));
    }

    fn set_state(&mut self, state: &str) {
        self.state = state.to_string();
        self.emit(format!("NEWSTATE {}", state));
    }

    /// Accept one frame from the data socket
    pub fn load_frame(&mut self, frame: DataFrame) {
        debug!("Virtual TNC loading {} bytes", frame.body.len());
        self.buffer.extend_from_slice(&frame.body);
    }

    /// Handle one command line
    pub fn process_line(&mut self, line: &str) {
        let line = line.trim();
        self.commands.push(line.to_string());

        let (keyword, value) = match line.split_once(' ') {
            Some((k, v)) => (k.to_ascii_uppercase(), v.trim().to_string()),
            None => (line.to_ascii_uppercase(), String::new()),
        };

        match keyword.as_str() {
            "INITIALIZE" => {
                self.buffer.clear();
                self.emit("INITIALIZE");
            }
            "MYCALL" => {
                self.callsign = value.clone();
                self.echo("MYCALL", &value);
            }
            "GRIDSQUARE" => {
                self.gridsquare = value.clone();
                self.echo("GRIDSQUARE", &value);
            }
            "PROTOCOLMODE" => match value.parse() {
                Ok(mode) => {
                    self.protocol_mode = mode;
                    self.echo("PROTOCOLMODE", &value);
                }
                Err(_) => self.emit(format!("FAULT Syntax Err: {}", line)),
            },
            "FECMODE" => match value.parse() {
                Ok(mode) => {
                    self.fec_mode = mode;
                    self.echo("FECMODE", &value);
                }
                Err(_) => self.emit(format!("FAULT Syntax Err: {}", line)),
            },
            "FECREPEATS" => match value.parse() {
                Ok(n) => {
                    self.repeats = n;
                    self.echo("FECREPEATS", &value);
                }
                Err(_) => self.emit(format!("FAULT Syntax Err: {}", line)),
            },
            "FECID" | "LISTEN" | "ENABLEPINGACK" | "USE600MODES" => {
                self.echo(&keyword, &value);
            }
            "BUFFER" => self.report_buffer(),
            "STATE" => {
                let state = self.state.clone();
                self.emit(format!("STATE {}", state));
            }
            "PURGEBUFFER" => {
                self.buffer.clear();
                self.emit("PURGEBUFFER");
                self.report_buffer();
            }
            "ABORT" => {
                self.emit("ABORT");
                if self.keyed {
                    self.keyed = false;
                    self.emit("PTT FALSE");
                }
                self.buffer.clear();
                self.set_state("DISC");
            }
            "FECSEND" => {
                self.echo("FECSEND", &value);
                if value.eq_ignore_ascii_case("TRUE") && !self.buffer.is_empty() {
                    self.set_state("FECSend");
                    self.keyed = true;
                    self.emit("PTT TRUE");
                    self.transmitted.push(std::mem::take(&mut self.buffer));
                    self.report_buffer();
                    self.keyed = false;
                    self.emit("PTT FALSE");
                    self.set_state("DISC");
                }
            }
            _ => self.emit(format!("FAULT Not recognized: {}", line)),
        }
    }
}
