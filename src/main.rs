fn main() -> anyhow::Result<()> {
    cirgen::driver::main()
}
