//! Backends de capture : le chemin noyau RFC2783 et le chemin d'attente
//! sur ligne modem en espace utilisateur, unifiés derrière une seule
//! petite capacité (§9 "Polymorphism over capture backend").
//!
//! Les deux backends ne sont pas symétriques dans leur pilotage — le
//! waiter en espace utilisateur bloque le worker et c'est lui qui
//! réveille réellement la boucle ; la source noyau n'est qu'*interrogée*
//! ensuite, soit sans bloquer (on sait déjà qu'un front vient de se
//! produire), soit avec un court délai. `EdgeCapture::capture` modélise
//! les deux formes avec un seul argument `CaptureMode` plutôt que deux
//! méthodes de trait distinctes.

pub mod kernel;
pub mod userspace;

use crate::error::MonitorError;
use crate::timespec::Timespec;

/// Polarité d'une transition sur une ligne de contrôle modem ou une
/// source PPS noyau. `Assert` = inactif -> actif (§ Glossaire).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    Clear = 0,
    Assert = 1,
}

impl Polarity {
    pub fn other(self) -> Polarity {
        match self {
            Polarity::Clear => Polarity::Assert,
            Polarity::Assert => Polarity::Clear,
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Un front capturé : un horodatage et sa polarité.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapturedEdge {
    pub timestamp: Timespec,
    pub polarity: Polarity,
}

/// Comment un appel de capture doit se comporter : bloquer jusqu'à ce
/// qu'il se passe quelque chose, ou revenir immédiatement/sous un court
/// délai (§4.2 "Fetch operation").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMode {
    Block,
    Poll,
}

pub trait EdgeCapture {
    /// Capture un front. `Ok(None)` signifie que le backend n'avait rien
    /// à signaler en mode `Poll` (ex. le fetch noyau n'a trouvé aucune
    /// paire assert/clear plus fraîche) ; `Block` ne renvoie jamais
    /// `Ok(None)`.
    fn capture(&mut self, mode: CaptureMode) -> Result<Option<CapturedEdge>, MonitorError>;
}
