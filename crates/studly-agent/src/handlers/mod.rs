pub mod a2a;
pub mod agent_card;
pub mod conversations;
pub mod health;
