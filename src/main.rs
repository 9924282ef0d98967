use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    chatservice::cli::main()
}
