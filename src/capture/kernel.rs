//! Adaptateur de capture PPS noyau RFC2783 (§4.2).
//!
//! Fondé sur la disposition des ioctls Linux `PPS_IOC_*` (magique
//! `'p'`, `GETPARAMS`/`SETPARAMS`/`GETCAP`/`FETCH`) de la même manière
//! qu'un binding RFC2783 basé sur `nix` les définirait : des structures
//! `#[repr(C)]` plus des wrappers générés par `nix::ioctl_*!`.
//! Facultatif de bout en bout — toute défaillance dans la chaîne de
//! mise en place renvoie `Err(raison)` pour que l'appelant journalise
//! puis retombe sur le chemin en espace utilisateur, jamais une erreur
//! fatale (§4.2 contract).

use std::fs;
use std::os::unix::io::RawFd;
use std::path::{Path, PathBuf};

use crate::error::MonitorError;
use crate::timespec::Timespec;

use super::{CaptureMode, CapturedEdge, EdgeCapture, Polarity};

/// Préfixe marquant un chemin de périphérique comme étant déjà une
/// source PPS plutôt qu'un tty (§4.2 "device path begins with the
/// platform's PPS-device prefix").
pub const PPS_DEVICE_PREFIX: &str = "/dev/pps";

#[cfg(target_os = "linux")]
mod linux {
    use nix::libc::c_int;

    pub const PPS_MAGIC: u8 = b'p';
    pub const PPS_IOC_GETPARAMS: u8 = 0xA1;
    pub const PPS_IOC_SETPARAMS: u8 = 0xA2;
    pub const PPS_IOC_GETCAP: u8 = 0xA3;
    pub const PPS_IOC_FETCH: u8 = 0xA4;

    pub const PPS_CAPTUREASSERT: c_int = 0x01;
    pub const PPS_CAPTURECLEAR: c_int = 0x02;
    pub const PPS_CAPTUREBOTH: c_int = PPS_CAPTUREASSERT | PPS_CAPTURECLEAR;

    pub const N_PPS_LDISC: c_int = 18;

    #[derive(Debug, Clone, Copy)]
    #[repr(C)]
    pub struct PpsKtime {
        pub tv_sec: i64,
        pub tv_nsec: i32,
        pub flags: u32,
    }

    impl Default for PpsKtime {
        fn default() -> Self {
            PpsKtime { tv_sec: 0, tv_nsec: 0, flags: 0 }
        }
    }

    #[derive(Debug, Clone, Copy, Default)]
    #[repr(C)]
    pub struct PpsInfo {
        pub assert_sequence: u32,
        pub clear_sequence: u32,
        pub assert_tu: PpsKtime,
        pub clear_tu: PpsKtime,
        pub current_mode: c_int,
    }

    #[derive(Debug, Clone, Copy, Default)]
    #[repr(C)]
    pub struct PpsParams {
        pub api_version: c_int,
        pub mode: c_int,
        pub assert_off_tu: PpsKtime,
        pub clear_off_tu: PpsKtime,
    }

    #[derive(Debug, Clone, Copy, Default)]
    #[repr(C)]
    pub struct PpsFetchArgs {
        pub info: PpsInfo,
        pub timeout: PpsKtime,
    }

    nix::ioctl_read!(pps_get_params, PPS_MAGIC, PPS_IOC_GETPARAMS, PpsParams);
    nix::ioctl_write_ptr!(pps_set_params, PPS_MAGIC, PPS_IOC_SETPARAMS, PpsParams);
    nix::ioctl_read!(pps_get_cap, PPS_MAGIC, PPS_IOC_GETCAP, c_int);
    nix::ioctl_readwrite!(pps_fetch, PPS_MAGIC, PPS_IOC_FETCH, PpsFetchArgs);
}

#[cfg(target_os = "linux")]
pub struct KernelPpsSource {
    fd: RawFd,
    device_name: String,
}

#[cfg(target_os = "linux")]
impl KernelPpsSource {
    /// Politique de mise en place du §4.2 : résout un périphérique
    /// `/dev/ppsN` pour `device_name`, en attachant d'abord la
    /// discipline de ligne PPS si le chemin ne nomme pas déjà un
    /// périphérique PPS, puis `create` + demande des paramètres.
    /// Renvoie `Err(raison)` (jamais de panique) sur tout échec, pour
    /// que l'appelant journalise puis retombe sur le waiter en espace
    /// utilisateur.
    pub fn setup(tty_fd: RawFd, device_name: &str) -> Result<Self, String> {
        if !is_tty(tty_fd) {
            return Err(format!("{device_name}: not a tty, cannot attach kernel PPS"));
        }

        let pps_path = if device_name.starts_with(PPS_DEVICE_PREFIX) {
            PathBuf::from(device_name)
        } else {
            attach_line_discipline(tty_fd)
                .map_err(|e| format!("{device_name}: failed to attach PPS line discipline: {e}"))?;
            discover_pps_device(device_name)
                .ok_or_else(|| format!("{device_name}: no matching /sys/class/pps node"))?
        };

        let fd = open_readwrite(&pps_path)
            .ok_or_else(|| format!("{}: failed to open {}", device_name, pps_path.display()))?;

        let mut source = KernelPpsSource {
            fd,
            device_name: device_name.to_string(),
        };

        // Les capacités ne servent qu'au diagnostic (§4.2) ; on les lit
        // pour confirmer que le nœud répond bien à FETCH/GETCAP.
        if source.get_cap().is_none() {
            source.close();
            return Err(format!("{device_name}: PPS_IOC_GETCAP failed"));
        }

        if source.request_params().is_none() {
            source.close();
            return Err(format!("{device_name}: PPS_IOC_SETPARAMS/GETPARAMS failed"));
        }

        Ok(source)
    }

    fn get_cap(&self) -> Option<i32> {
        let mut cap: i32 = 0;
        let rc = unsafe { linux::pps_get_cap(self.fd, &mut cap) };
        rc.ok().map(|_| cap)
    }

    fn request_params(&mut self) -> Option<()> {
        let mut params = linux::PpsParams {
            api_version: 1,
            mode: linux::PPS_CAPTUREBOTH,
            ..Default::default()
        };
        unsafe { linux::pps_set_params(self.fd, &params) }.ok()?;
        unsafe { linux::pps_get_params(self.fd, &mut params) }.ok()?;
        Some(())
    }

    /// Récupère la paire assert/clear la plus récente. `Block` attend
    /// jusqu'à 1s (§4.2 "otherwise block up to 1 s") ; `Poll` utilise un
    /// délai nul, c'est-à-dire "ne pas attendre" — utilisé juste après
    /// un réveil `TIOCMIWAIT`.
    fn fetch(&self, mode: CaptureMode) -> Option<linux::PpsInfo> {
        let timeout = match mode {
            CaptureMode::Poll => linux::PpsKtime::default(),
            CaptureMode::Block => linux::PpsKtime {
                tv_sec: 1,
                tv_nsec: 0,
                flags: 0,
            },
        };
        let mut args = linux::PpsFetchArgs {
            info: linux::PpsInfo::default(),
            timeout,
        };
        unsafe { linux::pps_fetch(self.fd, &mut args) }.ok()?;
        Some(args.info)
    }

    fn close(&mut self) {
        if self.fd >= 0 {
            unsafe {
                libc::close(self.fd);
            }
            self.fd = -1;
        }
    }
}

#[cfg(target_os = "linux")]
impl EdgeCapture for KernelPpsSource {
    fn capture(&mut self, mode: CaptureMode) -> Result<Option<CapturedEdge>, MonitorError> {
        let info = match self.fetch(mode) {
            Some(info) => info,
            None => {
                return Err(MonitorError::KernelFetchFailed {
                    device: self.device_name.clone(),
                    source: std::io::Error::last_os_error(),
                })
            }
        };

        let assert_ts = Timespec::new(info.assert_tu.tv_sec, info.assert_tu.tv_nsec);
        let clear_ts = Timespec::new(info.clear_tu.tv_sec, info.clear_tu.tv_nsec);

        // Choisir le plus récent entre assert et clear (§4.2 "Pick the
        // newer... sec, then nsec").
        let (timestamp, polarity) = if assert_ts >= clear_ts {
            (assert_ts, Polarity::Assert)
        } else {
            (clear_ts, Polarity::Clear)
        };

        Ok(Some(CapturedEdge { timestamp, polarity }))
    }
}

#[cfg(target_os = "linux")]
impl Drop for KernelPpsSource {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(target_os = "linux")]
fn attach_line_discipline(tty_fd: RawFd) -> std::io::Result<()> {
    let ldisc: libc::c_int = linux::N_PPS_LDISC;
    let rc = unsafe { libc::ioctl(tty_fd, libc::TIOCSETD, &ldisc as *const libc::c_int) };
    if rc != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

/// Énumère les nœuds `/sys/class/pps/ppsN`, lit l'attribut `path` de
/// chacun, et choisit celui qui correspond à `device_name`. L'index est
/// extrait du nom de répertoire plutôt que découpé à un offset de
/// caractère fixe (§9 "Open question (globbing device index)").
#[cfg(target_os = "linux")]
fn discover_pps_device(device_name: &str) -> Option<PathBuf> {
    const SYSFS_PPS_CLASS: &str = "/sys/class/pps";

    for entry in fs::read_dir(SYSFS_PPS_CLASS).ok()? {
        let entry = entry.ok()?;
        let name = entry.file_name();
        let name = name.to_str()?;
        let index = name.strip_prefix("pps")?.parse::<u32>().ok()?;

        let path_attr = entry.path().join("path");
        let bound_device = fs::read_to_string(&path_attr).ok()?;
        if bound_device.trim() == device_name {
            return Some(PathBuf::from(format!("/dev/pps{index}")));
        }
    }

    None
}

#[cfg(target_os = "linux")]
fn open_readwrite(path: &Path) -> Option<RawFd> {
    use std::os::unix::ffi::OsStrExt;
    let c_path = std::ffi::CString::new(path.as_os_str().as_bytes()).ok()?;
    let fd = unsafe { libc::open(c_path.as_ptr(), libc::O_RDWR) };
    if fd < 0 {
        None
    } else {
        Some(fd)
    }
}

#[cfg(target_os = "linux")]
fn is_tty(fd: RawFd) -> bool {
    unsafe { libc::isatty(fd) == 1 }
}

/// Les systèmes RFC2783 non-Linux utilisent le descripteur série
/// lui-même comme descripteur de capture (§4.2) ; aucun binding n'est
/// porté ici pour eux, donc la mise en place signale toujours
/// "unsupported" et l'appelant retombe sur le chemin en espace
/// utilisateur, conformément au contrat "safe to call even when
/// unsupported at compile time" de l'adaptateur.
#[cfg(not(target_os = "linux"))]
pub struct KernelPpsSource;

#[cfg(not(target_os = "linux"))]
impl KernelPpsSource {
    pub fn setup(_tty_fd: RawFd, device_name: &str) -> Result<Self, String> {
        Err(format!("{device_name}: kernel PPS unsupported on this platform"))
    }
}

#[cfg(not(target_os = "linux"))]
impl EdgeCapture for KernelPpsSource {
    fn capture(&mut self, _mode: CaptureMode) -> Result<Option<CapturedEdge>, MonitorError> {
        Ok(None)
    }
}
