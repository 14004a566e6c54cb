mod amount;
pub use amount::{Amount, AmountParseError, BASIS_POINTS};
pub mod authz;
pub use authz::Msg;
pub mod events;
pub use events::{ContractEvent, EventError, TxEvent, TxResponse};
pub mod game;
pub use game::{CreatureInvariantError, GenomeError};
pub mod msg;
