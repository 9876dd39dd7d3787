mod common;
mod lifecycle;
mod visibility;
mod workers;
