pub mod ports;
pub mod credential_issuer;
pub mod job_dispatcher;
pub mod event_gate;
pub mod submission_use_case;
