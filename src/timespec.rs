//! Arithmétique normalisée sur un couple `(secondes, nanosecondes)`.
//!
//! Ne jamais réutiliser directement la structure `timespec` du système
//! pour des comparaisons — ce type impose dès le départ la forme
//! normalisée à signe cohérent, pour ne jamais comparer une valeur
//! non normalisée à une autre.

use std::fmt;

/// Un milliard, le nombre de nanosecondes dans une seconde.
const NSEC_PER_SEC: i64 = 1_000_000_000;

/// Un couple `(secondes, nanosecondes)` signé et normalisé.
///
/// Invariant : si `sec > 0` alors `0 <= nsec < 1e9` ; si `sec < 0` alors
/// `-1e9 < nsec <= 0` ; si `sec == 0`, les deux signes sont valides pour
/// `nsec`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timespec {
    pub sec: i64,
    pub nsec: i32,
}

impl Timespec {
    pub const ZERO: Timespec = Timespec { sec: 0, nsec: 0 };

    pub fn new(sec: i64, nsec: i32) -> Self {
        Self { sec, nsec }.normalize()
    }

    /// Applique la retenue unique nécessaire après une opération entre
    /// deux valeurs déjà normalisées (au plus un débordement de
    /// nanosecondes).
    pub fn normalize(self) -> Self {
        let mut sec = self.sec;
        let mut nsec = self.nsec as i64;

        if nsec >= NSEC_PER_SEC {
            nsec -= NSEC_PER_SEC;
            sec += 1;
        } else if nsec <= -NSEC_PER_SEC {
            nsec += NSEC_PER_SEC;
            sec -= 1;
        }

        // Aligner le signe de nsec sur celui de sec.
        if sec > 0 && nsec < 0 {
            nsec += NSEC_PER_SEC;
            sec -= 1;
        } else if sec < 0 && nsec > 0 {
            nsec -= NSEC_PER_SEC;
            sec += 1;
        }

        Timespec {
            sec,
            nsec: nsec as i32,
        }
    }

    pub fn add(self, other: Timespec) -> Timespec {
        Timespec {
            sec: self.sec + other.sec,
            nsec: self.nsec + other.nsec,
        }
        .normalize()
    }

    pub fn sub(self, other: Timespec) -> Timespec {
        Timespec {
            sec: self.sec - other.sec,
            nsec: self.nsec - other.nsec,
        }
        .normalize()
    }

    /// `(a - b)` exprimé en nanosecondes. Non saturant ; les appelants
    /// de ce crate ne lui passent jamais que des valeurs distantes de
    /// quelques secondes.
    pub fn diff_ns(self, other: Timespec) -> i64 {
        (self.sec - other.sec) * NSEC_PER_SEC + (self.nsec - other.nsec) as i64
    }

    /// `(a - b)` exprimé en microsecondes, pour l'arithmétique des
    /// fenêtres du classificateur (§4.4 travaille entièrement en
    /// microsecondes).
    pub fn diff_us(self, other: Timespec) -> i64 {
        self.diff_ns(other) / 1_000
    }

    pub fn from_secs_f64(secs: f64) -> Self {
        let sec = secs.floor() as i64;
        let nsec = ((secs - secs.floor()) * NSEC_PER_SEC as f64).round() as i32;
        Timespec { sec, nsec }.normalize()
    }
}

impl Default for Timespec {
    fn default() -> Self {
        Self::ZERO
    }
}

impl fmt::Display for Timespec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let negative = self.sec < 0 || (self.sec == 0 && self.nsec < 0);
        if negative {
            write!(f, "-{}.{:09}", self.sec.abs(), self.nsec.abs())
        } else {
            write!(f, "{}.{:09}", self.sec, self.nsec)
        }
    }
}
