/// This module contains functionality related to acquiring GNSS signals common to all systems
pub mod acquisition;

/// This module contains functionality related to tracking signals after acquisition
pub mod tracking;
