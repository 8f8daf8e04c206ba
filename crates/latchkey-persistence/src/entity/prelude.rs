pub use super::identity_user::Entity as IdentityUser;
