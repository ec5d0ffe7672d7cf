pub mod penmount;
