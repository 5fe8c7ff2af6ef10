mod config;
mod environment;
mod gate;
mod listeners;
