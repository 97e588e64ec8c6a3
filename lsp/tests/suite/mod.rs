mod lifecycle;
mod streaming;
