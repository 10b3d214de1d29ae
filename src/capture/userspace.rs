//! Waiter de front en espace utilisateur : bloque sur `TIOCMIWAIT`
//! jusqu'à ce qu'une ligne de contrôle modem surveillée change, puis
//! prend un instantané de l'horloge et du bitmap (§4.3).
//!
//! Les étapes (i)-(iii) de `capture()` forment la section critique en
//! latence décrite dans le "Rationale" du §4.3 : copier d'abord l'heure
//! de fix partagée, puis lire l'horloge, puis lire le bitmap, dans cet
//! ordre, pour que la lecture d'horloge soit aussi proche que possible
//! du réveil.

use std::os::unix::io::RawFd;

use crate::error::MonitorError;
use crate::timespec::Timespec;

use super::{CaptureMode, CapturedEdge, EdgeCapture, Polarity};

bitflags::bitflags! {
    /// Lignes de contrôle modem surveillées par ce waiter.
    /// Carrier-Detect, Ring-Indicator et Clear-To-Send (ou leurs
    /// synonymes) sont les trois lignes sur lesquelles les récepteurs
    /// GNSS câblent couramment le PPS (§4.3).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ModemLines: i32 {
        const CARRIER_DETECT = libc::TIOCM_CD;
        const RING_INDICATOR = libc::TIOCM_RI;
        const CLEAR_TO_SEND  = libc::TIOCM_CTS;
    }
}

pub struct UserEdgeWaiter {
    fd: RawFd,
    device_name: String,
    monitored: ModemLines,
    state_last: i32,
}

impl UserEdgeWaiter {
    pub fn new(fd: RawFd, device_name: impl Into<String>, monitored: ModemLines) -> Result<Self, MonitorError> {
        let device_name = device_name.into();
        let state_last = read_bitmap(fd, &device_name)?;
        Ok(UserEdgeWaiter {
            fd,
            device_name,
            monitored,
            state_last,
        })
    }

    pub fn state_last(&self) -> i32 {
        self.state_last
    }

    fn wait_for_change(&self) -> Result<(), MonitorError> {
        // L'argument de TIOCMIWAIT est un masque d'événements, pas un
        // pointeur — la forme ioctl_write_int! de nix, ici émise
        // directement via libc pour garder le module autonome.
        let mask: libc::c_int = self.monitored.bits();
        let rc = unsafe { libc::ioctl(self.fd, libc::TIOCMIWAIT as _, mask) };
        if rc != 0 {
            return Err(MonitorError::EdgeWaitFailed {
                device: self.device_name.clone(),
                source: std::io::Error::last_os_error(),
            });
        }
        Ok(())
    }
}

impl EdgeCapture for UserEdgeWaiter {
    fn capture(&mut self, mode: CaptureMode) -> Result<Option<CapturedEdge>, MonitorError> {
        if mode == CaptureMode::Poll {
            // Le waiter n'a pas de mode non bloquant ; seule la source
            // noyau est jamais interrogée en poll (le cas "immediately
            // after a TIOCMIWAIT wakeup" du §4.2 vise l'*autre*
            // backend).
            return Ok(None);
        }

        self.wait_for_change()?;

        let clock_ts = read_realtime_clock(&self.device_name)?;
        let raw_state = read_bitmap(self.fd, &self.device_name)?;
        let state = raw_state & self.monitored.bits();
        let state_last = self.state_last & self.monitored.bits();

        let polarity = if state > state_last {
            Polarity::Assert
        } else {
            Polarity::Clear
        };

        self.state_last = raw_state;

        Ok(Some(CapturedEdge {
            timestamp: clock_ts,
            polarity,
        }))
    }
}

fn read_bitmap(fd: RawFd, device_name: &str) -> Result<i32, MonitorError> {
    let mut bits: libc::c_int = 0;
    let rc = unsafe { libc::ioctl(fd, libc::TIOCMGET as _, &mut bits as *mut libc::c_int) };
    if rc != 0 {
        return Err(MonitorError::BitmapReadFailed {
            device: device_name.to_string(),
            source: std::io::Error::last_os_error(),
        });
    }
    Ok(bits)
}

fn read_realtime_clock(device_name: &str) -> Result<Timespec, MonitorError> {
    let mut ts = std::mem::MaybeUninit::<libc::timespec>::uninit();
    let rc = unsafe { libc::clock_gettime(libc::CLOCK_REALTIME, ts.as_mut_ptr()) };
    if rc != 0 {
        return Err(MonitorError::ClockReadFailed {
            device: device_name.to_string(),
            source: std::io::Error::last_os_error(),
        });
    }
    let ts = unsafe { ts.assume_init() };
    Ok(Timespec::new(ts.tv_sec as i64, ts.tv_nsec as i32))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monitored_lines_default_set() {
        let all = ModemLines::CARRIER_DETECT | ModemLines::RING_INDICATOR | ModemLines::CLEAR_TO_SEND;
        assert!(all.contains(ModemLines::CLEAR_TO_SEND));
        assert!(!ModemLines::CARRIER_DETECT.contains(ModemLines::CLEAR_TO_SEND));
    }
}
