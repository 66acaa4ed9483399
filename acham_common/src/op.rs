//! Implements the standard arithmetic traits for single-field tuple structs. The caller brings
//! the traits into scope.

#[macro_export]
macro_rules! op {
    (binary $ty:ty, $trait:ident, $method:ident) => {
        impl $trait for $ty {
            type Output = Self;

            fn $method(self, rhs: Self) -> Self::Output {
                Self(self.0.$method(rhs.0))
            }
        }
    };

    (inplace $ty:ty, $trait:ident, $method:ident) => {
        impl $trait for $ty {
            fn $method(&mut self, rhs: Self) {
                self.0.$method(rhs.0)
            }
        }
    };

    (unary $ty:ty, $trait:ident, $method:ident) => {
        impl $trait for $ty {
            type Output = Self;

            fn $method(self) -> Self::Output {
                Self(self.0.$method())
            }
        }
    };
}
