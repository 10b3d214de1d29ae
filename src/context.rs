//! `MonitorContext` : l'état par périphérique partagé entre le worker
//! du moniteur et le reste du démon (§3, §5).
//!
//! Un mutex par contexte, pas un mutex unique pour tout le processus
//! (§9 note de conception "Global mutex") — le faux partage entre
//! périphériques ne peut survenir que si un démon exécute un contexte
//! par périphérique et réutilise un mutex entre eux, ce que ce type
//! rend structurellement impossible.

use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use crate::hooks::{MonitorHooks, TimeDelta};
use crate::timespec::Timespec;

/// La dernière heure de fix GPS reçue dans la bande et la lecture de
/// l'horloge hôte à son arrivée (§3 `fixin_real`, `fixin_clock`).
#[derive(Debug, Clone, Copy, Default)]
pub struct FixTime {
    pub real: Timespec,
    pub clock: Timespec,
}

/// Un instantané cohérent de la dernière impulsion publiée et du
/// compteur d'acceptations, monotone non décroissant (§6 `lastpps`).
#[derive(Debug, Clone, Copy, Default)]
pub struct PpsSnapshot {
    pub delta: TimeDelta,
    pub count: u64,
}

struct HotState {
    fixin: FixTime,
    ppsout: TimeDelta,
}

/// État partagé par périphérique. `device_fd`/`device_name` sont en
/// lecture seule après construction ; `fixin`/`ppsout`/`count` sont
/// protégés par un seul mutex ; `running` est le drapeau d'arrêt
/// coopératif que le worker consulte en tête de chaque itération, à la
/// place d'un écrasement des hooks.
pub struct MonitorContext {
    pub device_fd: RawFd,
    pub device_name: String,
    pub hooks: Box<dyn MonitorHooks>,
    running: AtomicBool,
    count: AtomicU64,
    hot: Mutex<HotState>,
}

impl MonitorContext {
    pub fn new(device_fd: RawFd, device_name: impl Into<String>, hooks: Box<dyn MonitorHooks>) -> Self {
        MonitorContext {
            device_fd,
            device_name: device_name.into(),
            hooks,
            running: AtomicBool::new(false),
            count: AtomicU64::new(0),
            hot: Mutex::new(HotState {
                fixin: FixTime::default(),
                ppsout: TimeDelta::default(),
            }),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub(crate) fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }

    /// `stash_fixtime` (§6) : écrase la dernière heure de fix connue.
    /// Appelé par le lecteur série (hors périmètre) à chaque fix valide.
    pub fn stash_fixtime(&self, real: Timespec, clock: Timespec) {
        match self.hot.lock() {
            Ok(mut guard) => guard.fixin = FixTime { real, clock },
            Err(poisoned) => {
                // Une section critique courte et idempotente ne peut
                // pas laisser la structure incohérente ; récupérer est
                // sûr (§5 "Mutex-op failure").
                poisoned.into_inner().fixin = FixTime { real, clock };
            }
        }
    }

    pub(crate) fn copy_out_fixtime(&self) -> FixTime {
        match self.hot.lock() {
            Ok(guard) => guard.fixin,
            Err(poisoned) => poisoned.into_inner().fixin,
        }
    }

    /// `lastpps` (§6) : un instantané cohérent de la dernière
    /// publication et du compteur d'acceptations qu'un consommateur
    /// peut interroger pour suivre la progression.
    pub fn lastpps(&self) -> PpsSnapshot {
        let delta = match self.hot.lock() {
            Ok(guard) => guard.ppsout,
            Err(poisoned) => poisoned.into_inner().ppsout,
        };
        PpsSnapshot {
            delta,
            count: self.count.load(Ordering::Acquire),
        }
    }

    /// Publie une impulsion acceptée : écrit `ppsout` et incrémente
    /// `count` dans la même section critique, pour que chaque
    /// incrément corresponde exactement à une écriture précédente (§5
    /// "Ordering guarantees").
    pub(crate) fn publish_locked(&self, delta: TimeDelta) -> u64 {
        match self.hot.lock() {
            Ok(mut guard) => guard.ppsout = delta,
            Err(poisoned) => poisoned.into_inner().ppsout = delta,
        }
        self.count.fetch_add(1, Ordering::AcqRel) + 1
    }
}
