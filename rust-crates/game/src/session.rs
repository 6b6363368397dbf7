//! Where the player is and what the UI is waiting on.
//!
//! States come in four families: `Select` (choosing a target), `Enter`
//! (typing an amount), `Wait` (an operation is in flight) and `Result`
//! (its outcome). Transitions are pure; see [`step`] and [`complete`].

mod machine;
mod state;

pub use machine::{
    Effect,
    InputEvent,
    Menu,
    SessionMachine,
    Transition,
    complete,
    step,
};
pub use state::{
    AmountField,
    EnterState,
    GameView,
    ResultState,
    SelectOption,
    SelectState,
    SelectTarget,
    SessionState,
    Task,
    WaitState,
};
