pub mod input_sim;
pub mod key_state;
pub mod types;
