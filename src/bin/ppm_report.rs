use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    defect_ppm::apps::run_ppm_report(std::env::args().skip(1))
}
