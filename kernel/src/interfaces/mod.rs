/*!
 * Collaborator Interfaces
 *
 * Contracts of the subsystems the team/thread core consumes but does not
 * implement, each with a small in-crate default used when the kernel is
 * booted without an override.
 */

mod address_space;
mod image;
mod io_context;
mod scheduler;

pub use address_space::{AddressSpaceFacility, AddressSpaceHandle, AddressSpaces};
pub use image::{AcceptAllImages, ImageLoader};
pub use io_context::{IoContextFacility, IoContextHandle, IoContexts};
pub use scheduler::{RunQueue, Scheduler};
