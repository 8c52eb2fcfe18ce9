use super::connection::MountLink;
use super::error::MountError;

const REPLY_BYTES: usize = 0x400;

/// Typed command set of the mount controller.
///
/// Variables are read with `MG <name>`; the reply is the value followed by
/// `\r\n:`. Commands without a value reply with a bare `:`.
pub struct MountCommands {
    link: Box<dyn MountLink>,
}

impl MountCommands {
    pub fn new(link: Box<dyn MountLink>) -> Self {
        Self { link }
    }

    pub fn terminate(&self) -> Result<(), MountError> {
        self.link.terminate()
    }

    pub fn set_lna(&self, on: bool) -> Result<bool, MountError> {
        self.command_ok(if on { "SB8" } else { "CB8" })
    }

    pub fn set_noise_diode(&self, on: bool) -> Result<bool, MountError> {
        self.command_ok(if on { "SB9" } else { "CB9" })
    }

    /// Resets the control hardware to its power-on state.
    pub fn reset_hardware(&self) -> Result<bool, MountError> {
        self.command_ok("RS")
    }

    /// Drives both axes to their end stops to re-establish the position reference.
    pub fn reset_pointing(&self) -> Result<bool, MountError> {
        for cmd in ["HX0", "HX1", "HX2", "HX3"] {
            self.link.send_and_receive(cmd, REPLY_BYTES)?;
        }
        self.command_ok("XQ #INIT")
    }

    pub fn set_target_az_cog(&self, cog: i64) -> Result<bool, MountError> {
        self.command_ok(&format!("t_az={}", cog))
    }

    pub fn set_target_el_cog(&self, cog: i64) -> Result<bool, MountError> {
        self.command_ok(&format!("t_el={}", cog))
    }

    pub fn knows_position(&self) -> Result<bool, MountError> {
        Ok(self.read_int("knowpos")? != 0)
    }

    pub fn target_az_cog(&self) -> Result<i64, MountError> {
        self.read_int("t_az")
    }

    pub fn target_el_cog(&self) -> Result<i64, MountError> {
        self.read_int("t_el")
    }

    pub fn current_az_cog(&self) -> Result<i64, MountError> {
        self.read_int("c_az")
    }

    pub fn current_el_cog(&self) -> Result<i64, MountError> {
        self.read_int("c_el")
    }

    pub fn min_az_cog(&self) -> Result<i64, MountError> {
        self.read_int("minaz")
    }

    pub fn max_az_cog(&self) -> Result<i64, MountError> {
        self.read_int("maxaz")
    }

    pub fn min_el_cog(&self) -> Result<i64, MountError> {
        self.read_int("minel")
    }

    pub fn max_el_cog(&self) -> Result<i64, MountError> {
        self.read_int("maxel")
    }

    /// Degrees per cog in azimuth.
    pub fn az_step(&self) -> Result<f64, MountError> {
        self.read_float("az_dpch")
    }

    /// Degrees per cog in elevation.
    pub fn el_step(&self) -> Result<f64, MountError> {
        self.read_float("el_dpch")
    }

    pub fn motors_running(&self) -> Result<bool, MountError> {
        let d_az = (self.target_az_cog()? - self.current_az_cog()?).abs();
        let d_el = (self.target_el_cog()? - self.current_el_cog()?).abs();
        Ok(d_az > 0 || d_el > 0)
    }

    pub fn stop_motors(&self) -> Result<(), MountError> {
        self.set_target_az_cog(self.current_az_cog()?)?;
        self.set_target_el_cog(self.current_el_cog()?)?;
        Ok(())
    }

    fn command_ok(&self, cmd: &str) -> Result<bool, MountError> {
        let reply = self.link.send_and_receive(cmd, REPLY_BYTES)?;
        Ok(reply.trim() == ":")
    }

    fn read_value(&self, var: &str) -> Result<String, MountError> {
        let cmd = format!("MG {}", var);
        let reply = self.link.send_and_receive(&cmd, REPLY_BYTES)?;
        match reply.strip_suffix(':') {
            Some(value) => Ok(value.trim().to_string()),
            None => Err(MountError::MalformedResponse {
                command: cmd,
                response: reply,
            }),
        }
    }

    fn read_float(&self, var: &str) -> Result<f64, MountError> {
        let value = self.read_value(var)?;
        value
            .parse::<f64>()
            .map_err(|_| MountError::MalformedResponse {
                command: format!("MG {}", var),
                response: value,
            })
    }

    fn read_int(&self, var: &str) -> Result<i64, MountError> {
        // the controller reports every variable in fixed point
        Ok(self.read_float(var)?.trunc() as i64)
    }
}
