mod listeners;
mod server;
