// pigpio daemon socket client
//
// pigpiod listens on TCP (default port 8888). Every request is 16 bytes:
// [cmd, p1, p2, p3] as little-endian u32. The reply echoes cmd, p1, p2 and puts
// the i32 result in the last word; a negative result is a pigpio error code.

use std::io::{ErrorKind, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::{debug, info};

use super::gpio::{Gpio, GpioError, Level, PinMode, Result};
use crate::config::PIGPIOD_TIMEOUT;

const FRAME_LEN: usize = 16;

/// pigpio socket command numbers
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Modes = 0,
    Read = 3,
    Write = 4,
    Pwm = 5,
    Pfs = 7,
}

/// Connection to a running pigpio daemon
pub struct PigpiodClient {
    stream: TcpStream,
}

impl PigpiodClient {
    /// Connect to the daemon, e.g. "127.0.0.1:8888"
    pub fn connect(addr: &str) -> Result<Self> {
        Self::connect_with_timeout(addr, PIGPIOD_TIMEOUT)
    }

    pub fn connect_with_timeout(addr: &str, timeout: Duration) -> Result<Self> {
        let connect_err = |source| GpioError::Connect {
            addr: addr.to_string(),
            source,
        };

        let sock_addr = addr
            .to_socket_addrs()
            .map_err(connect_err)?
            .next()
            .ok_or_else(|| connect_err(std::io::Error::from(ErrorKind::AddrNotAvailable)))?;

        let stream = TcpStream::connect_timeout(&sock_addr, timeout).map_err(connect_err)?;
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;
        stream.set_nodelay(true)?;

        info!("Connected to pigpio daemon at {}", sock_addr);
        Ok(Self { stream })
    }

    fn build_request(cmd: Command, p1: u32, p2: u32) -> [u8; FRAME_LEN] {
        let mut frame = [0u8; FRAME_LEN];
        frame[0..4].copy_from_slice(&(cmd as u32).to_le_bytes());
        frame[4..8].copy_from_slice(&p1.to_le_bytes());
        frame[8..12].copy_from_slice(&p2.to_le_bytes());
        // p3: no extension bytes follow
        frame
    }

    fn parse_reply(cmd: Command, pin: u8, reply: &[u8; FRAME_LEN]) -> Result<i32> {
        let echoed = u32::from_le_bytes([reply[0], reply[1], reply[2], reply[3]]);
        if echoed != cmd as u32 {
            return Err(GpioError::InvalidReply {
                cmd: cmd as u32,
                reason: format!("daemon echoed command {}", echoed),
            });
        }

        let res = i32::from_le_bytes([reply[12], reply[13], reply[14], reply[15]]);
        if res < 0 {
            return Err(GpioError::Command {
                cmd: cmd as u32,
                pin,
                code: res,
            });
        }
        Ok(res)
    }

    /// Send one command and wait for its reply
    fn command(&mut self, cmd: Command, pin: u8, p2: u32) -> Result<i32> {
        let request = Self::build_request(cmd, pin as u32, p2);
        self.stream.write_all(&request)?;

        let mut reply = [0u8; FRAME_LEN];
        self.stream.read_exact(&mut reply).map_err(|e| match e.kind() {
            ErrorKind::TimedOut | ErrorKind::WouldBlock => GpioError::Timeout,
            _ => GpioError::Io(e),
        })?;

        let res = Self::parse_reply(cmd, pin, &reply)?;
        debug!("pigpio {:?} pin={} p2={} -> {}", cmd, pin, p2, res);
        Ok(res)
    }
}

impl Gpio for PigpiodClient {
    fn set_mode(&mut self, pin: u8, mode: PinMode) -> Result<()> {
        self.command(Command::Modes, pin, mode as u32).map(|_| ())
    }

    fn set_pwm_frequency(&mut self, pin: u8, hz: u32) -> Result<()> {
        // Returns the closest frequency the daemon could set
        let actual = self.command(Command::Pfs, pin, hz)?;
        if actual as u32 != hz {
            debug!("Pin {} PWM frequency {} Hz (requested {} Hz)", pin, actual, hz);
        }
        Ok(())
    }

    fn set_duty_cycle(&mut self, pin: u8, duty: u8) -> Result<()> {
        self.command(Command::Pwm, pin, duty as u32).map(|_| ())
    }

    fn write_digital(&mut self, pin: u8, level: Level) -> Result<()> {
        let value = match level {
            Level::Low => 0,
            Level::High => 1,
        };
        self.command(Command::Write, pin, value).map(|_| ())
    }

    fn read_digital(&mut self, pin: u8) -> Result<Level> {
        let res = self.command(Command::Read, pin, 0)?;
        Ok(Level::from(res != 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    fn reply(cmd: u32, p1: u32, p2: u32, res: i32) -> [u8; FRAME_LEN] {
        let mut frame = [0u8; FRAME_LEN];
        frame[0..4].copy_from_slice(&cmd.to_le_bytes());
        frame[4..8].copy_from_slice(&p1.to_le_bytes());
        frame[8..12].copy_from_slice(&p2.to_le_bytes());
        frame[12..16].copy_from_slice(&res.to_le_bytes());
        frame
    }

    #[test]
    fn test_build_request() {
        let frame = PigpiodClient::build_request(Command::Pwm, 12, 127);
        assert_eq!(&frame[0..4], &[5, 0, 0, 0]);
        assert_eq!(&frame[4..8], &[12, 0, 0, 0]);
        assert_eq!(&frame[8..12], &[127, 0, 0, 0]);
        assert_eq!(&frame[12..16], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_parse_reply() {
        let ok = reply(3, 4, 0, 1);
        assert_eq!(PigpiodClient::parse_reply(Command::Read, 4, &ok).unwrap(), 1);

        // PI_BAD_GPIO
        let bad = reply(4, 99, 1, -3);
        assert!(matches!(
            PigpiodClient::parse_reply(Command::Write, 99, &bad),
            Err(GpioError::Command { cmd: 4, pin: 99, code: -3 })
        ));

        let wrong = reply(0, 4, 1, 0);
        assert!(matches!(
            PigpiodClient::parse_reply(Command::Write, 4, &wrong),
            Err(GpioError::InvalidReply { .. })
        ));
    }

    #[test]
    fn test_round_trip_with_fake_daemon() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        // Echo each request back with result = p2
        let daemon = thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            let mut seen = Vec::new();
            let mut buf = [0u8; FRAME_LEN];
            while conn.read_exact(&mut buf).is_ok() {
                let cmd = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
                let p1 = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
                let p2 = u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]);
                seen.push((cmd, p1, p2));
                conn.write_all(&reply(cmd, p1, p2, p2 as i32)).unwrap();
            }
            seen
        });

        let mut client = PigpiodClient::connect(&addr).unwrap();
        client.set_mode(12, PinMode::Output).unwrap();
        client.set_pwm_frequency(12, 10_000).unwrap();
        client.set_duty_cycle(12, 76).unwrap();
        client.write_digital(17, Level::High).unwrap();
        drop(client);

        let seen = daemon.join().unwrap();
        assert_eq!(
            seen,
            vec![(0, 12, 1), (7, 12, 10_000), (5, 12, 76), (4, 17, 1)]
        );
    }

    #[test]
    fn test_connect_refused() {
        // Grab a free port, then close it so nothing is listening
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().to_string()
        };
        assert!(matches!(
            PigpiodClient::connect(&addr),
            Err(GpioError::Connect { .. })
        ));
    }
}
