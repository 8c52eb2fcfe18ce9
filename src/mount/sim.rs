//! In-memory mount controller speaking the text protocol.
//!
//! Reading `c_az`/`c_el` first moves the current cog counters `speed` cogs
//! towards the target, so a polling caller sees the mount slew.

use std::collections::HashMap;
use std::sync::Mutex;

use super::connection::MountLink;
use super::error::MountError;

struct State {
    vars: HashMap<String, f64>,
    speed: i64,
    lna: bool,
    diode: bool,
    homing_fails: bool,
    sent: Vec<String>,
}

pub struct SimulatedMount {
    state: Mutex<State>,
}

impl SimulatedMount {
    /// Azimuth cogs 0..3600 and elevation cogs 0..800 at 0.1 deg per cog,
    /// resting at cog (300, 400) with a known position.
    pub fn new() -> Self {
        let vars = [
            ("minaz", 0.0),
            ("maxaz", 3600.0),
            ("minel", 0.0),
            ("maxel", 800.0),
            ("az_dpch", 0.1),
            ("el_dpch", 0.1),
            ("c_az", 300.0),
            ("c_el", 400.0),
            ("t_az", 300.0),
            ("t_el", 400.0),
            ("knowpos", 1.0),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        Self {
            state: Mutex::new(State {
                vars,
                speed: 50,
                lna: false,
                diode: false,
                homing_fails: false,
                sent: Vec::new(),
            }),
        }
    }

    pub fn set_var(&self, name: &str, value: f64) {
        self.state.lock().unwrap().vars.insert(name.to_string(), value);
    }

    pub fn var(&self, name: &str) -> f64 {
        self.state.lock().unwrap().vars[name]
    }

    /// Cogs moved per position read; 0 freezes the mount.
    pub fn set_speed(&self, speed: i64) {
        self.state.lock().unwrap().speed = speed;
    }

    /// `XQ #INIT` is acknowledged but never restores the position reference.
    pub fn set_homing_fails(&self, fails: bool) {
        self.state.lock().unwrap().homing_fails = fails;
    }

    pub fn lna_on(&self) -> bool {
        self.state.lock().unwrap().lna
    }

    pub fn diode_on(&self) -> bool {
        self.state.lock().unwrap().diode
    }

    /// Every command except variable reads, in order.
    pub fn sent(&self) -> Vec<String> {
        self.state.lock().unwrap().sent.clone()
    }
}

fn step_towards(vars: &mut HashMap<String, f64>, current: &str, target: &str, speed: i64) {
    let c = vars[current] as i64;
    let t = vars[target] as i64;
    let next = c + (t - c).clamp(-speed, speed);
    vars.insert(current.to_string(), next as f64);
}

impl MountLink for SimulatedMount {
    fn send_and_receive(&self, command: &str, _max_reply: usize) -> Result<String, MountError> {
        let mut state = self.state.lock().unwrap();
        let speed = state.speed;

        if let Some(var) = command.strip_prefix("MG ") {
            match var {
                "c_az" => step_towards(&mut state.vars, "c_az", "t_az", speed),
                "c_el" => step_towards(&mut state.vars, "c_el", "t_el", speed),
                _ => {}
            }
            return Ok(match state.vars.get(var) {
                Some(v) => format!(" {:.4}\r\n:", v),
                None => "?".to_string(),
            });
        }

        state.sent.push(command.to_string());
        if let Some((var, value)) = command.split_once('=') {
            return Ok(match value.parse::<f64>() {
                Ok(v) => {
                    state.vars.insert(var.to_string(), v);
                    ":".to_string()
                }
                Err(_) => "?".to_string(),
            });
        }

        let reply = match command {
            "SB8" => {
                state.lna = true;
                ":"
            }
            "CB8" => {
                state.lna = false;
                ":"
            }
            "SB9" => {
                state.diode = true;
                ":"
            }
            "CB9" => {
                state.diode = false;
                ":"
            }
            "RS" => {
                state.vars.insert("knowpos".into(), 0.0);
                "\r\n:"
            }
            "HX0" | "HX1" | "HX2" | "HX3" => ":",
            "XQ #INIT" if state.homing_fails => ":",
            "XQ #INIT" => {
                let min_az = state.vars["minaz"];
                let min_el = state.vars["minel"];
                for (k, v) in [("c_az", min_az), ("t_az", min_az), ("c_el", min_el), ("t_el", min_el)] {
                    state.vars.insert(k.into(), v);
                }
                state.vars.insert("knowpos".into(), 1.0);
                ":"
            }
            _ => "?",
        };
        Ok(reply.to_string())
    }

    fn terminate(&self) -> Result<(), MountError> {
        self.state.lock().unwrap().sent.push("<terminate>".to_string());
        Ok(())
    }
}
