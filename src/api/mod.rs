pub mod attachment;
pub mod department;
pub mod ticket;
pub mod user;

pub use self::{
    attachment::Attachment, department::Department, ticket::Ticket,
    user::User,
};
