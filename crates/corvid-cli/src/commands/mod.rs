pub(crate) mod check;
pub(crate) mod helpers;
pub(crate) mod verify;
