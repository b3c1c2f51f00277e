mod gateway;

pub use gateway::serve_gateway;
