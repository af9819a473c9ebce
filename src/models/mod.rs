mod book;
mod feedback;
mod placement;
mod room;
mod user;

pub use book::{Book, BookLoan, LoanStatus, LOAN_PERIOD_DAYS};
pub use feedback::{Feedback, FeedbackCategory, FeedbackPriority};
pub use placement::Placement;
pub use room::Room;
pub use user::{Role, User};
