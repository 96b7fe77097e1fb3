pub mod coordinate;
pub mod report;
pub mod site;
pub mod weather_record;
