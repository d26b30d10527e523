pub mod autopick;
pub mod clock;
pub mod completion;
pub mod engine;
pub mod events;
pub mod order;
pub mod pick;
pub mod pool;
pub mod roster;
pub mod sequencer;
pub mod state;
