fn main() -> anyhow::Result<()> {
    cordova_build_ios::run()
}
