use welltrack::core::models::deck::Deck;
use welltrack::core::models::ids::{PipetteId, WellId};
use welltrack::engine::config::{ForwardOptions, ReverseOptions};
use welltrack::workflows::mixing::{MixParams, MixPattern};
use welltrack::workflows::transfer::TransferRequest;

/// One protocol step with every name resolved to a deck id.
#[derive(Debug, Clone)]
pub enum ProtocolStep {
    TransferForward {
        request: TransferRequest,
        options: ForwardOptions,
    },
    TransferReverse {
        request: TransferRequest,
        options: ReverseOptions,
    },
    Mix {
        pipette: PipetteId,
        well: WellId,
        params: MixParams,
    },
    MixPattern {
        pipette: PipetteId,
        well: WellId,
        volume: f64,
        cycles: u32,
        pattern: MixPattern,
    },
    Wet {
        pipette: PipetteId,
        well: WellId,
        volume: f64,
        cycles: u32,
    },
}

impl ProtocolStep {
    pub fn kind(&self) -> &'static str {
        match self {
            ProtocolStep::TransferForward { .. } => "forward transfer",
            ProtocolStep::TransferReverse { .. } => "reverse transfer",
            ProtocolStep::Mix { .. } | ProtocolStep::MixPattern { .. } => "mix",
            ProtocolStep::Wet { .. } => "tip wetting",
        }
    }
}

/// Which wells and constituents end up in the final report. Empty lists select everything.
#[derive(Debug, Clone, Default)]
pub struct ReportSelection {
    pub wells: Vec<WellId>,
    pub constituents: Vec<String>,
}

#[derive(Debug)]
pub struct AppConfig {
    pub deck: Deck,
    pub steps: Vec<ProtocolStep>,
    pub report: ReportSelection,
}
