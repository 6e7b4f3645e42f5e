fn main() {
    // Version info and icon for the Windows executable
    #[cfg(target_os = "windows")]
    {
        let mut res = winres::WindowsResource::new();
        res.set("ProductName", "TVDeck");
        res.set("FileDescription", "TVDeck internet TV player");

        if std::path::Path::new("assets/icon.ico").exists() {
            res.set_icon("assets/icon.ico");
        }

        if let Err(e) = res.compile() {
            println!("cargo:warning=Failed to embed Windows resources: {}", e);
        }
    }
}
