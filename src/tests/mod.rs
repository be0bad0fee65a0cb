pub mod common;

mod private_key_flow;
