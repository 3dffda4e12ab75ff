pub mod pexels;
