pub mod constants;
pub mod state;
pub mod systems;
pub mod track;
pub mod vehicle;
pub mod game_loop;
pub mod match_result;
pub mod performance;
pub mod input_buffer;
