// private sub-modules defined in other files
mod is_clockwise_order;
mod poly_ops;

// exports identifiers from private sub-modules in the current module namespace
pub use self::is_clockwise_order::is_clockwise_order;
pub use self::poly_ops::point_on_ring_surface;
