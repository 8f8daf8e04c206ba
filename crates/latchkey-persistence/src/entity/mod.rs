pub mod prelude;

pub mod identity_user;
