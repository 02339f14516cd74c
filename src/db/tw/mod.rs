// Transwestern operationally available capacity, from the Energy Transfer iPost portal.
pub mod lib_ipost;
pub mod operational_capacity_archive;
pub mod pipeline;
pub mod raw_table;
pub mod transform;
pub mod validate;
